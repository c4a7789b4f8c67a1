//! Unmatched queue: invoice lines with no order, held for manual resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use freightrecon_core::{Carrier, NewShipment, Order, ParseEnumError, ParsedInvoiceRecord, TrackingNumber};

use crate::context::ReconContext;
use crate::error::ReconError;
use crate::store::{OrderLookup, ReconStore, StoreError, UnmatchedStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedStatus {
    Pending,
    Matched,
    Voided,
    Resolved,
}

impl UnmatchedStatus {
    pub const ALL: [UnmatchedStatus; 4] = [
        UnmatchedStatus::Pending,
        UnmatchedStatus::Matched,
        UnmatchedStatus::Voided,
        UnmatchedStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedStatus::Pending => "pending",
            UnmatchedStatus::Matched => "matched",
            UnmatchedStatus::Voided => "voided",
            UnmatchedStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for UnmatchedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnmatchedStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        UnmatchedStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == key)
            .ok_or_else(|| ParseEnumError {
                kind: "unmatched status",
                value: s.to_string(),
                expected: "pending, matched, voided, resolved",
            })
    }
}

/// A record entering the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewUnmatched {
    pub carrier: Carrier,
    pub record: ParsedInvoiceRecord,
    /// The source row as header → cell, verbatim.
    pub raw: Value,
    pub source_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedRecord {
    pub id: i64,
    pub carrier: Carrier,
    #[serde(flatten)]
    pub record: ParsedInvoiceRecord,
    pub raw: Value,
    pub source_file: Option<String>,
    pub status: UnmatchedStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
    pub matched_order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl UnmatchedRecord {
    pub fn from_new(id: i64, new: &NewUnmatched) -> Self {
        Self {
            id,
            carrier: new.carrier,
            record: new.record.clone(),
            raw: new.raw.clone(),
            source_file: new.source_file.clone(),
            status: UnmatchedStatus::Pending,
            resolved_at: None,
            resolved_by: None,
            notes: None,
            matched_order_id: None,
            created_at: new.created_at,
        }
    }

    fn dedupe_key(&self) -> (TrackingNumber, Option<String>, i64) {
        (
            self.record.tracking_number.clone(),
            self.record.invoice_number.clone(),
            self.record.shipping_cost_cents,
        )
    }
}

/// Terminal state plus audit stamps, written in one go.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub status: UnmatchedStatus,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: Option<String>,
    pub notes: Option<String>,
    pub matched_order_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedFilter {
    pub status: Option<UnmatchedStatus>,
    pub carrier: Option<Carrier>,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for UnmatchedFilter {
    fn default() -> Self {
        Self {
            status: None,
            carrier: None,
            page: 1,
            per_page: 50,
        }
    }
}

impl UnmatchedFilter {
    pub fn accepts(&self, r: &UnmatchedRecord) -> bool {
        self.status.map_or(true, |s| r.status == s) && self.carrier.map_or(true, |c| r.carrier == c)
    }

    /// Rows to skip. Saturates, so an absurd page lands past the end.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<UnmatchedStatus>,
    /// Order id, order number, platform order id or customer name.
    pub order: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<String>,
}

/// Locate an order: id, then order number, then platform id, then the
/// first customer (by id) whose name contains the query.
pub fn find_order<S: OrderLookup + ?Sized>(store: &S, query: &str) -> Result<Option<Order>, StoreError> {
    let q = query.trim();
    if q.is_empty() {
        return Ok(None);
    }
    if let Ok(id) = q.parse::<i64>() {
        if let Some(o) = store.order_by_id(id)? {
            return Ok(Some(o));
        }
    }
    if let Some(o) = store.order_by_number(q)? {
        return Ok(Some(o));
    }
    if let Some(o) = store.order_by_platform_id(q)? {
        return Ok(Some(o));
    }
    Ok(store.orders_by_customer(q)?.into_iter().min_by_key(|o| o.id))
}

/// Move a pending record to a terminal status. `matched` also creates the
/// shipment and links it to the located order.
pub fn update_status<S: ReconStore + ?Sized>(
    store: &mut S,
    ctx: &ReconContext,
    id: i64,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> Result<UnmatchedRecord, ReconError> {
    let current = store.unmatched(id)?.ok_or(ReconError::UnmatchedNotFound(id))?;
    let to = update.status.unwrap_or(UnmatchedStatus::Resolved);

    if current.status != UnmatchedStatus::Pending || to == UnmatchedStatus::Pending {
        return Err(ReconError::TransitionRejected { id, from: current.status, to });
    }

    let mut resolution = Resolution {
        status: to,
        resolved_at: now,
        resolved_by: update.actor.clone(),
        notes: update.notes.clone(),
        matched_order_id: None,
    };

    let applied = if to == UnmatchedStatus::Matched {
        let query = update.order.as_deref().ok_or(ReconError::OrderRequired)?;
        let order = find_order(&*store, query)?.ok_or_else(|| ReconError::OrderNotFound(query.to_string()))?;

        let tracking = &current.record.tracking_number;
        let shipment_exists = || ReconError::ShipmentExists {
            tracking: tracking.clone(),
            carrier: current.carrier,
        };
        if store.shipment(tracking, current.carrier)?.is_some() {
            return Err(shipment_exists());
        }
        let template = ctx.carriers.template(current.carrier);
        let shipment = NewShipment::from_record(
            &current.record,
            current.carrier,
            template.provenance,
            Some(order.id),
            template.account_id.clone(),
        );
        resolution.matched_order_id = Some(order.id);
        let applied = match store.resolve_with_shipment(id, &shipment, &resolution) {
            Err(StoreError::Conflict(_)) => return Err(shipment_exists()),
            other => other?,
        };
        if applied {
            log::info!(
                "unmatched #{id}: shipment {} created for order {} ({})",
                tracking,
                order.id,
                order.order_number
            );
        }
        applied
    } else {
        store.save_resolution(id, &resolution)?
    };

    if !applied {
        let from = store.unmatched(id)?.map_or(current.status, |r| r.status);
        return Err(ReconError::TransitionRejected { id, from, to });
    }
    store.unmatched(id)?.ok_or(ReconError::UnmatchedNotFound(id))
}

pub fn delete<S: UnmatchedStore + ?Sized>(store: &mut S, id: i64) -> Result<(), ReconError> {
    match store.delete_unmatched(&[id])? {
        0 => Err(ReconError::UnmatchedNotFound(id)),
        _ => Ok(()),
    }
}

pub fn list<S: UnmatchedStore + ?Sized>(store: &S, filter: &UnmatchedFilter) -> Result<Page<UnmatchedRecord>, ReconError> {
    Ok(store.list_unmatched(filter)?)
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupeReport {
    /// Groups with more than one member.
    pub groups: usize,
    pub kept: Vec<i64>,
    pub deleted: Vec<i64>,
}

/// Group pending records by (tracking, invoice number, cost); keep the
/// earliest of each group, lowest id on ties.
pub fn plan_dedupe(records: &[UnmatchedRecord]) -> DedupeReport {
    let mut groups: BTreeMap<(TrackingNumber, Option<String>, i64), Vec<&UnmatchedRecord>> = BTreeMap::new();
    for r in records.iter().filter(|r| r.status == UnmatchedStatus::Pending) {
        groups.entry(r.dedupe_key()).or_default().push(r);
    }

    let mut report = DedupeReport::default();
    for mut members in groups.into_values().filter(|m| m.len() > 1) {
        members.sort_by_key(|r| (r.created_at, r.id));
        report.groups += 1;
        report.kept.push(members[0].id);
        report.deleted.extend(members[1..].iter().map(|r| r.id));
    }
    report.kept.sort_unstable();
    report.deleted.sort_unstable();
    report
}

pub fn dedupe<S: UnmatchedStore + ?Sized>(store: &mut S) -> Result<DedupeReport, ReconError> {
    let pending = store.pending_unmatched()?;
    let report = plan_dedupe(&pending);
    if !report.deleted.is_empty() {
        let removed = store.delete_unmatched(&report.deleted)?;
        log::info!("dedupe: {} group(s), {} duplicate(s) removed", report.groups, removed);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use freightrecon_core::{CostProvenance, ExistingShipment};

    use crate::memory::MemoryStore;
    use crate::store::ShipmentLookup;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn new_unmatched(tracking: &str, invoice: Option<&str>, cents: i64, created: i64) -> NewUnmatched {
        NewUnmatched {
            carrier: Carrier::Dhl,
            record: ParsedInvoiceRecord {
                tracking_number: TrackingNumber::new(tracking),
                shipping_cost_cents: cents,
                currency: "GBP".into(),
                service_type: Some("Express".into()),
                weight_kg: None,
                shipping_date: None,
                invoice_number: invoice.map(str::to_string),
                source_row: 2,
            },
            raw: json!({ "AWB Number": tracking }),
            source_file: Some("dhl.csv".into()),
            created_at: at(created),
        }
    }

    fn store_with_orders() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_order(Order {
            id: 5,
            order_number: "ORD-5".into(),
            platform_order_id: Some("SHOP-500".into()),
            customer_name: "Grace Hopper".into(),
            tracking_numbers: vec![],
        });
        store.add_order(Order {
            id: 9,
            order_number: "ORD-9".into(),
            platform_order_id: None,
            customer_name: "Anita Borg".into(),
            tracking_numbers: vec![],
        });
        store.add_order(Order {
            id: 12,
            order_number: "5".into(),
            platform_order_id: None,
            customer_name: "Grace Hopper".into(),
            tracking_numbers: vec![],
        });
        store
    }

    #[test]
    fn find_order_tries_each_key_in_order() {
        let store = store_with_orders();
        assert_eq!(find_order(&store, "5").unwrap().unwrap().id, 5);
        assert_eq!(find_order(&store, "ORD-9").unwrap().unwrap().id, 9);
        assert_eq!(find_order(&store, "SHOP-500").unwrap().unwrap().id, 5);
        assert_eq!(find_order(&store, "hopper").unwrap().unwrap().id, 5);
        assert_eq!(find_order(&store, "borg").unwrap().unwrap().id, 9);
        assert!(find_order(&store, "nobody").unwrap().is_none());
        assert!(find_order(&store, "  ").unwrap().is_none());
    }

    #[test]
    fn offset_saturates_on_huge_pages() {
        let filter = UnmatchedFilter { page: 3, per_page: 20, ..Default::default() };
        assert_eq!(filter.offset(), 40);
        let huge = UnmatchedFilter { page: usize::MAX, per_page: usize::MAX, ..Default::default() };
        assert_eq!(huge.offset(), usize::MAX);

        let mut store = MemoryStore::new();
        store.insert_unmatched(&new_unmatched("1234567890", None, 100, 0)).unwrap();
        let page = store.list_unmatched(&huge).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
    }

    #[test]
    fn matching_creates_linked_shipment() {
        let mut store = store_with_orders();
        let id = store.insert_unmatched(&new_unmatched("1234567890", Some("INV-1"), 1250, 0)).unwrap();
        let ctx = ReconContext::default();

        let update = StatusUpdate {
            status: Some(UnmatchedStatus::Matched),
            order: Some("ORD-9".into()),
            notes: Some("customer emailed".into()),
            actor: Some("ops".into()),
        };
        let rec = update_status(&mut store, &ctx, id, &update, at(60)).unwrap();
        assert_eq!(rec.status, UnmatchedStatus::Matched);
        assert_eq!(rec.matched_order_id, Some(9));
        assert_eq!(rec.resolved_by.as_deref(), Some("ops"));
        assert_eq!(rec.resolved_at, Some(at(60)));
        assert_eq!(rec.notes.as_deref(), Some("customer emailed"));

        let s = store.shipment(&TrackingNumber::new("1234567890"), Carrier::Dhl).unwrap().unwrap();
        assert_eq!(s.order_id, Some(9));
        assert_eq!(s.shipping_cost_cents, 1250);
        assert!(!s.cost_locked);
        assert_eq!(s.cost_provenance, CostProvenance::Actual);
    }

    #[test]
    fn matching_needs_an_order() {
        let mut store = store_with_orders();
        let id = store.insert_unmatched(&new_unmatched("1234567890", None, 100, 0)).unwrap();
        let ctx = ReconContext::default();

        let no_ref = StatusUpdate { status: Some(UnmatchedStatus::Matched), ..Default::default() };
        assert!(matches!(update_status(&mut store, &ctx, id, &no_ref, at(1)), Err(ReconError::OrderRequired)));

        let unknown = StatusUpdate {
            status: Some(UnmatchedStatus::Matched),
            order: Some("nobody".into()),
            ..Default::default()
        };
        assert!(matches!(update_status(&mut store, &ctx, id, &unknown, at(1)), Err(ReconError::OrderNotFound(_))));
        assert_eq!(store.unmatched(id).unwrap().unwrap().status, UnmatchedStatus::Pending);
    }

    #[test]
    fn matching_rejected_when_shipment_exists() {
        let mut store = store_with_orders();
        store.add_shipment(ExistingShipment {
            tracking_number: TrackingNumber::new("1234567890"),
            carrier: Carrier::Dhl,
            order_id: None,
            shipping_cost_cents: 900,
            currency: "GBP".into(),
            cost_locked: false,
            cost_provenance: CostProvenance::Actual,
            version: 1,
        });
        let id = store.insert_unmatched(&new_unmatched("1234567890", None, 100, 0)).unwrap();
        let update = StatusUpdate {
            status: Some(UnmatchedStatus::Matched),
            order: Some("5".into()),
            ..Default::default()
        };
        let err = update_status(&mut store, &ReconContext::default(), id, &update, at(1)).unwrap_err();
        assert!(matches!(err, ReconError::ShipmentExists { .. }));
    }

    #[test]
    fn only_pending_records_transition() {
        let mut store = store_with_orders();
        let id = store.insert_unmatched(&new_unmatched("1234567890", None, 100, 0)).unwrap();
        let ctx = ReconContext::default();
        let void = StatusUpdate { status: Some(UnmatchedStatus::Voided), ..Default::default() };
        update_status(&mut store, &ctx, id, &void, at(1)).unwrap();

        let again = StatusUpdate {
            status: Some(UnmatchedStatus::Matched),
            order: Some("5".into()),
            ..Default::default()
        };
        let err = update_status(&mut store, &ctx, id, &again, at(2)).unwrap_err();
        assert_eq!(err.to_string(), format!("unmatched record {id} cannot move from voided to matched"));

        assert!(matches!(update_status(&mut store, &ctx, 999, &void, at(2)), Err(ReconError::UnmatchedNotFound(999))));
    }

    #[test]
    fn dedupe_keeps_earliest_of_each_group() {
        let mut store = MemoryStore::new();
        let late = store.insert_unmatched(&new_unmatched("1234567890", Some("INV-1"), 500, 30)).unwrap();
        let early = store.insert_unmatched(&new_unmatched("1234567890", Some("INV-1"), 500, 10)).unwrap();
        let mid = store.insert_unmatched(&new_unmatched("1234567890", Some("INV-1"), 500, 20)).unwrap();
        let other_cost = store.insert_unmatched(&new_unmatched("1234567890", Some("INV-1"), 501, 0)).unwrap();
        let other_invoice = store.insert_unmatched(&new_unmatched("1234567890", Some("INV-2"), 500, 0)).unwrap();

        let report = dedupe(&mut store).unwrap();
        assert_eq!(report.groups, 1);
        assert_eq!(report.kept, vec![early]);
        let mut deleted = vec![late, mid];
        deleted.sort_unstable();
        assert_eq!(report.deleted, deleted);

        let remaining: Vec<i64> = store.pending_unmatched().unwrap().iter().map(|r| r.id).collect();
        assert!(remaining.contains(&early));
        assert!(remaining.contains(&other_cost));
        assert!(remaining.contains(&other_invoice));
        assert_eq!(remaining.len(), 3);
    }

    #[test]
    fn dedupe_ties_keep_lowest_id() {
        let mut store = MemoryStore::new();
        let a = store.insert_unmatched(&new_unmatched("1234567890", None, 500, 0)).unwrap();
        let b = store.insert_unmatched(&new_unmatched("1234567890", None, 500, 0)).unwrap();
        let report = dedupe(&mut store).unwrap();
        assert_eq!(report.kept, vec![a.min(b)]);
        assert_eq!(report.deleted, vec![a.max(b)]);
    }

    #[test]
    fn dedupe_ignores_resolved_records() {
        let mut store = MemoryStore::new();
        let a = store.insert_unmatched(&new_unmatched("1234567890", None, 500, 0)).unwrap();
        store.insert_unmatched(&new_unmatched("1234567890", None, 500, 5)).unwrap();
        let void = StatusUpdate { status: Some(UnmatchedStatus::Voided), ..Default::default() };
        update_status(&mut store, &ReconContext::default(), a, &void, at(9)).unwrap();
        assert_eq!(dedupe(&mut store).unwrap().groups, 0);
    }

    #[test]
    fn delete_reports_missing() {
        let mut store = MemoryStore::new();
        let id = store.insert_unmatched(&new_unmatched("1234567890", None, 500, 0)).unwrap();
        delete(&mut store, id).unwrap();
        assert!(matches!(delete(&mut store, id), Err(ReconError::UnmatchedNotFound(_))));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Voided".parse::<UnmatchedStatus>().unwrap(), UnmatchedStatus::Voided);
        assert!("done".parse::<UnmatchedStatus>().is_err());
    }
}
