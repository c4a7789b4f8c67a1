use chrono::{DateTime, Utc};

use freightrecon_core::{Carrier, TrackingNumber};
use freightrecon_io::FormatError;

use crate::fields::SemanticField;
use crate::store::StoreError;
use crate::unmatched::UnmatchedStatus;

#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// The file could not be read as a table.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Storage failed outside per-record isolation (ledger write, lookups).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Commit attempted while tracking or cost is still unmapped.
    #[error("required column(s) not mapped: {}", field_list(.0))]
    MappingIncomplete(Vec<SemanticField>),

    /// Manual mapping names a column the file doesn't have.
    #[error("{field}: no column '{column}' in file")]
    UnknownColumn { field: SemanticField, column: String },

    #[error("invalid column assignment '{0}' (expected FIELD=COLUMN)")]
    InvalidManualMapping(String),

    #[error("invalid tracking pattern for {carrier}: {message}")]
    InvalidPattern { carrier: Carrier, message: String },

    /// Same bytes already committed for this carrier.
    #[error("file already committed for {carrier} as upload #{upload_id} at {uploaded_at}")]
    DuplicateUpload {
        carrier: Carrier,
        upload_id: i64,
        uploaded_at: DateTime<Utc>,
    },

    #[error("unmatched record {0} not found")]
    UnmatchedNotFound(i64),

    #[error("unmatched record {id} cannot move from {from} to {to}")]
    TransitionRejected {
        id: i64,
        from: UnmatchedStatus,
        to: UnmatchedStatus,
    },

    #[error("marking a record matched requires an order reference")]
    OrderRequired,

    #[error("no order matches '{0}'")]
    OrderNotFound(String),

    #[error("shipment {tracking} ({carrier}) already exists")]
    ShipmentExists { tracking: TrackingNumber, carrier: Carrier },

    #[error("upload outcome counts ({counted}) do not sum to total ({total})")]
    InconsistentCounts { counted: usize, total: usize },
}

fn field_list(fields: &[SemanticField]) -> String {
    fields.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
}
