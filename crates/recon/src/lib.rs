//! `freightrecon-recon`: carrier invoice reconciliation engine.
//!
//! Maps invoice columns, normalizes rows into typed records and decides per
//! record whether to create, update, add to, skip or block a shipment cost.
//! Storage is reached only through the traits in [`store`].

pub mod analyze;
pub mod carriers;
pub mod commit;
pub mod context;
pub mod decision;
pub mod error;
pub mod fields;
pub mod ledger;
pub mod mapper;
pub mod memory;
pub mod normalize;
pub mod store;
pub mod unmatched;

pub use analyze::{analyze, Analysis, AnalysisReport, AnalysisTotals, MappingReport, RecordDecision, UploadRequest};
pub use carriers::{CarrierOverride, CarrierRegistry, CarrierSummary, CarrierTemplate};
pub use commit::{analyze_and_commit, commit, CommitOptions, CommitReport, CommittedRecord};
pub use context::ReconContext;
pub use decision::{decide, Action, Decision, DecisionInput, DecisionReason};
pub use error::ReconError;
pub use fields::SemanticField;
pub use ledger::{NewUploadHistory, Outcome, UploadCounts, UploadHistory};
pub use mapper::{map_columns, ColumnMapping, ManualColumn, ManualMapping};
pub use memory::MemoryStore;
pub use normalize::{DropCounts, InvoiceLine};
pub use store::{
    CostWrite, OrderLookup, ReconStore, ShipmentLookup, ShipmentStore, StoreError, UnmatchedStore, UploadLedger,
    WriteOutcome,
};
pub use unmatched::{
    DedupeReport, NewUnmatched, Page, Resolution, StatusUpdate, UnmatchedFilter, UnmatchedRecord, UnmatchedStatus,
};
