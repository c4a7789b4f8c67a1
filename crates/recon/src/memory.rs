//! In-process store for tests and embedding.

use std::collections::BTreeMap;

use freightrecon_core::{Carrier, ExistingShipment, NewShipment, Order, TrackingNumber};

use crate::ledger::{NewUploadHistory, UploadHistory};
use crate::store::{
    CostWrite, OrderLookup, ShipmentLookup, ShipmentStore, StoreError, UnmatchedStore, UploadLedger,
    WriteOutcome,
};
use crate::unmatched::{NewUnmatched, Page, Resolution, UnmatchedFilter, UnmatchedRecord, UnmatchedStatus};

#[derive(Debug, Clone)]
struct ShipmentRow {
    current: ExistingShipment,
    account_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    orders: BTreeMap<i64, Order>,
    shipments: BTreeMap<(TrackingNumber, Carrier), ShipmentRow>,
    unmatched: BTreeMap<i64, UnmatchedRecord>,
    uploads: Vec<UploadHistory>,
    next_unmatched_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_order(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Seed a shipment as-is, version included.
    pub fn add_shipment(&mut self, shipment: ExistingShipment) {
        let key = (shipment.tracking_number.clone(), shipment.carrier);
        self.shipments.insert(key, ShipmentRow { current: shipment, account_id: None });
    }

    pub fn account_id(&self, tracking: &TrackingNumber, carrier: Carrier) -> Option<&str> {
        self.shipments
            .get(&(tracking.clone(), carrier))
            .and_then(|r| r.account_id.as_deref())
    }

    pub fn shipment_count(&self) -> usize {
        self.shipments.len()
    }

    fn row_mut(&mut self, tracking: &TrackingNumber, carrier: Carrier) -> Option<&mut ShipmentRow> {
        self.shipments.get_mut(&(tracking.clone(), carrier))
    }
}

impl OrderLookup for MemoryStore {
    fn order_by_id(&self, id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&id).cloned())
    }

    fn order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.values().find(|o| o.order_number == order_number).cloned())
    }

    fn order_by_platform_id(&self, platform_order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .values()
            .find(|o| o.platform_order_id.as_deref() == Some(platform_order_id))
            .cloned())
    }

    fn orders_by_customer(&self, fragment: &str) -> Result<Vec<Order>, StoreError> {
        let needle = fragment.to_lowercase();
        Ok(self
            .orders
            .values()
            .filter(|o| o.customer_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn order_for_tracking(&self, tracking: &TrackingNumber) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .values()
            .find(|o| o.tracking_numbers.contains(tracking))
            .cloned())
    }
}

impl ShipmentLookup for MemoryStore {
    fn shipment(&self, tracking: &TrackingNumber, carrier: Carrier) -> Result<Option<ExistingShipment>, StoreError> {
        Ok(self
            .shipments
            .get(&(tracking.clone(), carrier))
            .map(|r| r.current.clone()))
    }
}

impl ShipmentStore for MemoryStore {
    fn is_locked(&self, tracking: &TrackingNumber, carrier: Carrier) -> Result<Option<bool>, StoreError> {
        Ok(self
            .shipments
            .get(&(tracking.clone(), carrier))
            .map(|r| r.current.cost_locked))
    }

    fn insert_shipment(&mut self, shipment: &NewShipment) -> Result<ExistingShipment, StoreError> {
        let key = (shipment.tracking_number.clone(), shipment.carrier);
        if self.shipments.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "shipment {} ({}) already exists",
                shipment.tracking_number, shipment.carrier
            )));
        }
        let current = ExistingShipment {
            tracking_number: shipment.tracking_number.clone(),
            carrier: shipment.carrier,
            order_id: shipment.order_id,
            shipping_cost_cents: shipment.shipping_cost_cents,
            currency: shipment.currency.clone(),
            cost_locked: false,
            cost_provenance: shipment.cost_provenance,
            version: 1,
        };
        self.shipments.insert(
            key,
            ShipmentRow {
                current: current.clone(),
                account_id: shipment.account_id.clone(),
            },
        );
        Ok(current)
    }

    fn write_cost(
        &mut self,
        tracking: &TrackingNumber,
        carrier: Carrier,
        write: CostWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let Some(row) = self.row_mut(tracking, carrier) else {
            return Ok(WriteOutcome::Missing);
        };
        let s = &mut row.current;
        if s.cost_locked {
            return Ok(WriteOutcome::Locked);
        }
        if s.version != write.expected_version {
            return Ok(WriteOutcome::Stale { current_version: s.version });
        }
        s.shipping_cost_cents = write.cost_cents;
        s.cost_provenance = write.provenance;
        s.version += 1;
        Ok(WriteOutcome::Applied { version: s.version })
    }

    fn set_locked(&mut self, tracking: &TrackingNumber, carrier: Carrier, locked: bool) -> Result<bool, StoreError> {
        match self.row_mut(tracking, carrier) {
            Some(row) => {
                row.current.cost_locked = locked;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl UnmatchedStore for MemoryStore {
    fn insert_unmatched(&mut self, record: &NewUnmatched) -> Result<i64, StoreError> {
        self.next_unmatched_id += 1;
        let id = self.next_unmatched_id;
        self.unmatched.insert(id, UnmatchedRecord::from_new(id, record));
        Ok(id)
    }

    fn unmatched(&self, id: i64) -> Result<Option<UnmatchedRecord>, StoreError> {
        Ok(self.unmatched.get(&id).cloned())
    }

    fn list_unmatched(&self, filter: &UnmatchedFilter) -> Result<Page<UnmatchedRecord>, StoreError> {
        let mut matching: Vec<&UnmatchedRecord> = self.unmatched.values().filter(|r| filter.accepts(r)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page {
            total: matching.len(),
            items: matching
                .into_iter()
                .skip(filter.offset())
                .take(filter.per_page)
                .cloned()
                .collect(),
            page: filter.page,
            per_page: filter.per_page,
        })
    }

    fn pending_unmatched(&self) -> Result<Vec<UnmatchedRecord>, StoreError> {
        Ok(self
            .unmatched
            .values()
            .filter(|r| r.status == UnmatchedStatus::Pending)
            .cloned()
            .collect())
    }

    fn save_resolution(&mut self, id: i64, resolution: &Resolution) -> Result<bool, StoreError> {
        match self.unmatched.get_mut(&id) {
            Some(r) if r.status == UnmatchedStatus::Pending => {
                r.status = resolution.status;
                r.resolved_at = Some(resolution.resolved_at);
                r.resolved_by = resolution.resolved_by.clone();
                r.notes = resolution.notes.clone();
                r.matched_order_id = resolution.matched_order_id;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn resolve_with_shipment(
        &mut self,
        id: i64,
        shipment: &NewShipment,
        resolution: &Resolution,
    ) -> Result<bool, StoreError> {
        if !self.unmatched.get(&id).is_some_and(|r| r.status == UnmatchedStatus::Pending) {
            return Ok(false);
        }
        self.insert_shipment(shipment)?;
        self.save_resolution(id, resolution)
    }

    fn delete_unmatched(&mut self, ids: &[i64]) -> Result<usize, StoreError> {
        Ok(ids.iter().filter(|id| self.unmatched.remove(*id).is_some()).count())
    }
}

impl UploadLedger for MemoryStore {
    fn record_upload(&mut self, upload: &NewUploadHistory) -> Result<UploadHistory, StoreError> {
        let history = UploadHistory::from_new(self.uploads.len() as i64 + 1, upload);
        self.uploads.push(history.clone());
        Ok(history)
    }

    fn find_upload(&self, carrier: Carrier, digest: &str) -> Result<Option<UploadHistory>, StoreError> {
        Ok(self
            .uploads
            .iter()
            .rev()
            .find(|u| u.carrier == carrier && u.digest == digest)
            .cloned())
    }

    fn recent_uploads(&self, limit: usize) -> Result<Vec<UploadHistory>, StoreError> {
        Ok(self.uploads.iter().rev().take(limit).cloned().collect())
    }
}
