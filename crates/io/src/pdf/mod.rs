//! PDF invoice tables.

pub mod extract;
pub mod layout;

pub use layout::{PdfLayoutOptions, TextFragment, Tolerances, SPOT_CHECK_WARNING};

use crate::error::FormatError;
use crate::table::RawTable;

/// Extract positioned text and rebuild the invoice table.
pub fn read(bytes: &[u8], opts: &PdfLayoutOptions) -> Result<RawTable, FormatError> {
    let fragments = extract::extract_fragments(bytes)?;
    layout::reconstruct(fragments, opts)
}
