//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `frecon` exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | General error (unspecified, bad settings file)            |
//! | 2    | Usage error (bad args, bad `--map`, missing order ref)    |
//! | 3    | IO error (cannot read input file)                         |
//! | 4    | Invoice file format error                                 |
//! | 5    | Tracking or cost column not mapped                        |
//! | 6    | File already committed for this carrier                   |
//! | 7    | Commit finished but some records errored                  |
//! | 8    | Not found, or status transition rejected                  |
//! | 9    | Storage error                                             |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into [`recon_exit_code`] or the relevant command

use freightrecon_recon::{ReconError, StoreError};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Input file could not be read.
pub const EXIT_IO: u8 = 3;

/// File is not a readable invoice (encrypted or scanned PDF, no table, bad CSV).
pub const EXIT_FORMAT: u8 = 4;

/// Tracking or cost column still unmapped. `analyze` prints the headers first.
pub const EXIT_MAPPING_INCOMPLETE: u8 = 5;

/// Same bytes already committed for this carrier; `--force` overrides.
pub const EXIT_DUPLICATE_UPLOAD: u8 = 6;

/// Commit recorded, but at least one record ended `errored`.
pub const EXIT_PARTIAL_COMMIT: u8 = 7;

/// Unmatched record, order or shipment not found, or transition rejected.
pub const EXIT_NOT_FOUND: u8 = 8;

/// Database could not be opened, read or written.
pub const EXIT_STORAGE: u8 = 9;

pub fn store_exit_code(_err: &StoreError) -> u8 {
    EXIT_STORAGE
}

/// Map a ReconError to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::Format(_) => EXIT_FORMAT,
        ReconError::Store(e) => store_exit_code(e),
        ReconError::MappingIncomplete(_) => EXIT_MAPPING_INCOMPLETE,
        ReconError::UnknownColumn { .. } | ReconError::InvalidManualMapping(_) | ReconError::OrderRequired => {
            EXIT_USAGE
        }
        ReconError::InvalidPattern { .. } => EXIT_ERROR,
        ReconError::DuplicateUpload { .. } => EXIT_DUPLICATE_UPLOAD,
        ReconError::UnmatchedNotFound(_)
        | ReconError::TransitionRejected { .. }
        | ReconError::OrderNotFound(_)
        | ReconError::ShipmentExists { .. } => EXIT_NOT_FOUND,
        ReconError::InconsistentCounts { .. } => EXIT_ERROR,
    }
}

/// A hint worth printing under the error, if any.
pub fn recon_hint(err: &ReconError) -> Option<String> {
    match err {
        ReconError::MappingIncomplete(_) => {
            Some("run `frecon analyze` to see the headers, then pass --map FIELD=COLUMN".to_string())
        }
        ReconError::DuplicateUpload { .. } => Some("pass --force to commit it again".to_string()),
        ReconError::OrderRequired => Some("pass --order <id|number|platform id|customer>".to_string()),
        ReconError::InvalidPattern { .. } => Some("fix tracking_patterns in the settings file".to_string()),
        _ => None,
    }
}
