//! Storage seams. The engine reads and writes only through these traits.
//!
//! Lookups take `&self` so analysis can run against a shared borrow; every
//! mutation takes `&mut self`.

use serde::Serialize;

use freightrecon_core::{Carrier, CostProvenance, ExistingShipment, NewShipment, Order, TrackingNumber};

use crate::ledger::{NewUploadHistory, UploadHistory};
use crate::unmatched::{NewUnmatched, Page, Resolution, UnmatchedFilter, UnmatchedRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A write collided with existing state (duplicate key, etc).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value could not be read back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Backend(err.into())
    }
}

/// Result of a lock-guarded, version-guarded cost write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    Applied { version: i64 },
    /// `cost_locked` was set at write time; nothing written.
    Locked,
    /// Row version moved since the snapshot; nothing written.
    Stale { current_version: i64 },
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostWrite {
    pub cost_cents: i64,
    pub provenance: CostProvenance,
    /// Version observed in the snapshot the decision was made from.
    pub expected_version: i64,
}

pub trait OrderLookup {
    fn order_by_id(&self, id: i64) -> Result<Option<Order>, StoreError>;
    fn order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError>;
    fn order_by_platform_id(&self, platform_order_id: &str) -> Result<Option<Order>, StoreError>;
    /// Case-insensitive substring match on customer name, ordered by id.
    fn orders_by_customer(&self, fragment: &str) -> Result<Vec<Order>, StoreError>;
    /// The order that references this tracking number, lowest id first.
    fn order_for_tracking(&self, tracking: &TrackingNumber) -> Result<Option<Order>, StoreError>;
}

pub trait ShipmentLookup {
    fn shipment(&self, tracking: &TrackingNumber, carrier: Carrier) -> Result<Option<ExistingShipment>, StoreError>;
}

pub trait ShipmentStore: ShipmentLookup {
    /// Current lock flag; `None` if the shipment is gone.
    fn is_locked(&self, tracking: &TrackingNumber, carrier: Carrier) -> Result<Option<bool>, StoreError>;

    /// Insert an unlocked shipment at version 1. `Conflict` if it already exists.
    fn insert_shipment(&mut self, shipment: &NewShipment) -> Result<ExistingShipment, StoreError>;

    /// Write a cost only if the row is unlocked and still at `expected_version`.
    fn write_cost(
        &mut self,
        tracking: &TrackingNumber,
        carrier: Carrier,
        write: CostWrite,
    ) -> Result<WriteOutcome, StoreError>;

    /// Manual lock toggle, outside reconciliation. `false` if no such shipment.
    fn set_locked(&mut self, tracking: &TrackingNumber, carrier: Carrier, locked: bool) -> Result<bool, StoreError>;
}

pub trait UnmatchedStore {
    fn insert_unmatched(&mut self, record: &NewUnmatched) -> Result<i64, StoreError>;
    fn unmatched(&self, id: i64) -> Result<Option<UnmatchedRecord>, StoreError>;
    /// Newest first.
    fn list_unmatched(&self, filter: &UnmatchedFilter) -> Result<Page<UnmatchedRecord>, StoreError>;
    fn pending_unmatched(&self) -> Result<Vec<UnmatchedRecord>, StoreError>;
    /// Apply a resolution only while the record is still pending.
    /// Returns `false` if it wasn't.
    fn save_resolution(&mut self, id: i64, resolution: &Resolution) -> Result<bool, StoreError>;
    /// Insert `shipment` and apply `resolution` as one unit: either both
    /// land or neither does. `false` if the record was no longer pending;
    /// `Conflict` if the shipment already exists.
    fn resolve_with_shipment(
        &mut self,
        id: i64,
        shipment: &NewShipment,
        resolution: &Resolution,
    ) -> Result<bool, StoreError>;
    /// Returns how many rows were deleted.
    fn delete_unmatched(&mut self, ids: &[i64]) -> Result<usize, StoreError>;
}

pub trait UploadLedger {
    fn record_upload(&mut self, upload: &NewUploadHistory) -> Result<UploadHistory, StoreError>;
    /// Most recent upload of this content for this carrier.
    fn find_upload(&self, carrier: Carrier, digest: &str) -> Result<Option<UploadHistory>, StoreError>;
    /// Most recent first.
    fn recent_uploads(&self, limit: usize) -> Result<Vec<UploadHistory>, StoreError>;
}

/// Everything reconciliation needs from one backend.
pub trait ReconStore: OrderLookup + ShipmentStore + UnmatchedStore + UploadLedger {}

impl<T> ReconStore for T where T: OrderLookup + ShipmentStore + UnmatchedStore + UploadLedger {}
