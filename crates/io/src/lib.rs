//! `freightrecon-io`: turn invoice files into uniform tables.
//!
//! Every adapter returns a [`RawTable`]; nothing downstream needs to know
//! which format a row came from.

pub mod csv;
pub mod detect;
pub mod error;
pub mod pdf;
pub mod spreadsheet;
pub mod table;

use sha2::{Digest, Sha256};

pub use detect::{detect, FileKind};
pub use error::FormatError;
pub use pdf::PdfLayoutOptions;
pub use table::{RawRow, RawTable};

/// Detect the file type and run the matching adapter.
pub fn read_table(bytes: &[u8], filename: Option<&str>, pdf_opts: &PdfLayoutOptions) -> Result<(FileKind, RawTable), FormatError> {
    if bytes.is_empty() {
        return Err(FormatError::Empty);
    }
    let kind = detect(bytes, filename);
    log::info!(
        "reading {} as {}",
        filename.unwrap_or("<buffer>"),
        kind.as_str()
    );
    let table = match kind {
        FileKind::Csv => csv::read(bytes)?,
        FileKind::Xlsx | FileKind::Xls => spreadsheet::read(bytes)?,
        FileKind::Pdf => pdf::read(bytes, pdf_opts)?,
        FileKind::Unknown => return Err(FormatError::UnsupportedType(filename.map(str::to_string))),
    };
    Ok((kind, table))
}

/// SHA-256 of the raw upload, lowercase hex.
pub fn digest(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_csv_by_extension() {
        let (kind, table) = read_table(b"AWB,Amount\n123,4.50\n", Some("dhl.csv"), &PdfLayoutOptions::default()).unwrap();
        assert_eq!(kind, FileKind::Csv);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn unknown_type_is_not_parsed() {
        let err = read_table(b"AWB,Amount\n", Some("invoice.docx"), &PdfLayoutOptions::default()).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedType(Some(ref n)) if n == "invoice.docx"));
        assert_eq!(err.to_string(), "unsupported file type: invoice.docx");
    }

    #[test]
    fn empty_buffer_is_empty() {
        assert!(matches!(read_table(b"", Some("x.csv"), &PdfLayoutOptions::default()), Err(FormatError::Empty)));
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
