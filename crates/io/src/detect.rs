//! Content-based file type detection.

use std::path::Path;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
    Pdf,
    Unknown,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Xlsx => "xlsx",
            FileKind::Xls => "xls",
            FileKind::Pdf => "pdf",
            FileKind::Unknown => "unknown",
        }
    }
}

const PDF_MAGIC: &[u8; 4] = b"%PDF";
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const OLE_MAGIC: &[u8; 4] = b"\xD0\xCF\x11\xE0";

/// Classify a buffer by its first four bytes, falling back to the file
/// extension only for delimited text (`.csv`, `.tsv`, `.txt`).
pub fn detect(bytes: &[u8], filename: Option<&str>) -> FileKind {
    if bytes.is_empty() {
        return FileKind::Unknown;
    }

    if bytes.len() >= 4 {
        let magic = &bytes[..4];
        if magic == PDF_MAGIC {
            return FileKind::Pdf;
        }
        if magic == ZIP_MAGIC {
            return FileKind::Xlsx;
        }
        if magic == OLE_MAGIC {
            return FileKind::Xls;
        }
    }

    let ext = filename
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("csv" | "tsv" | "txt") => FileKind::Csv,
        _ => FileKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_numbers_win_over_extension() {
        assert_eq!(detect(b"%PDF-1.7\n...", Some("invoice.csv")), FileKind::Pdf);
        assert_eq!(detect(b"PK\x03\x04rest", Some("invoice.pdf")), FileKind::Xlsx);
        assert_eq!(detect(b"\xD0\xCF\x11\xE0\xA1\xB1", None), FileKind::Xls);
    }

    #[test]
    fn text_falls_back_to_extension() {
        assert_eq!(detect(b"AWB,Amount\n1,2\n", Some("dhl.CSV")), FileKind::Csv);
        assert_eq!(detect(b"a\tb\n", Some("export.tsv")), FileKind::Csv);
        assert_eq!(detect(b"a,b\n", Some("dir/notes.txt")), FileKind::Csv);
    }

    #[test]
    fn unknown_without_signature_or_known_extension() {
        assert_eq!(detect(b"a,b\n", None), FileKind::Unknown);
        assert_eq!(detect(b"\x89PNG\r\n", Some("scan.png")), FileKind::Unknown);
        assert_eq!(detect(b"", Some("empty.csv")), FileKind::Unknown);
    }

    #[test]
    fn short_buffers_use_extension() {
        assert_eq!(detect(b"a", Some("x.csv")), FileKind::Csv);
        assert_eq!(detect(b"%P", None), FileKind::Unknown);
    }
}
