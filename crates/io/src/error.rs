/// Why a file could not be turned into a table. Fatal for that file.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("unsupported file type{}", .0.as_deref().map(|n| format!(": {n}")).unwrap_or_default())]
    UnsupportedType(Option<String>),

    #[error("file is empty")]
    Empty,

    #[error("file has no header row")]
    MissingHeader,

    #[error("cannot read CSV: {0}")]
    Csv(String),

    #[error("cannot read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("spreadsheet has no worksheets")]
    NoSheets,

    #[error("PDF is encrypted; remove the password and upload again")]
    EncryptedPdf,

    #[error("PDF has no extractable text (scanned or image-only document)")]
    ScannedPdf,

    #[error("no usable table found in PDF ({rows} row(s) reconstructed, need at least 2)")]
    NoTableFound { rows: usize },

    #[error("cannot read PDF: {0}")]
    Pdf(String),
}
