use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::carrier::{Carrier, CostProvenance};
use crate::tracking::TrackingNumber;

// ---------------------------------------------------------------------------
// Invoice side
// ---------------------------------------------------------------------------

/// One invoice line after normalization. Cost is always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvoiceRecord {
    pub tracking_number: TrackingNumber,
    pub shipping_cost_cents: i64,
    pub currency: String,
    pub service_type: Option<String>,
    pub weight_kg: Option<f64>,
    /// `None` means the date was missing or unparseable.
    pub shipping_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    /// 1-based row in the source file, header row included.
    pub source_row: usize,
}

// ---------------------------------------------------------------------------
// Dashboard side (consulted, not owned)
// ---------------------------------------------------------------------------

/// A shipment already known to the dashboard, keyed by (tracking, carrier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingShipment {
    pub tracking_number: TrackingNumber,
    pub carrier: Carrier,
    pub order_id: Option<i64>,
    pub shipping_cost_cents: i64,
    pub currency: String,
    pub cost_locked: bool,
    pub cost_provenance: CostProvenance,
    /// Bumped by every cost write; conditional writes compare against it.
    pub version: i64,
}

/// A shipment about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShipment {
    pub tracking_number: TrackingNumber,
    pub carrier: Carrier,
    pub order_id: Option<i64>,
    pub shipping_cost_cents: i64,
    pub currency: String,
    pub cost_provenance: CostProvenance,
    pub account_id: Option<String>,
    pub service_type: Option<String>,
    pub weight_kg: Option<f64>,
    pub shipping_date: Option<NaiveDate>,
}

impl NewShipment {
    /// Build an unlocked shipment from an invoice line.
    pub fn from_record(
        record: &ParsedInvoiceRecord,
        carrier: Carrier,
        provenance: CostProvenance,
        order_id: Option<i64>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            tracking_number: record.tracking_number.clone(),
            carrier,
            order_id,
            shipping_cost_cents: record.shipping_cost_cents,
            currency: record.currency.clone(),
            cost_provenance: provenance,
            account_id,
            service_type: record.service_type.clone(),
            weight_kg: record.weight_kg,
            shipping_date: record.shipping_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub platform_order_id: Option<String>,
    pub customer_name: String,
    pub tracking_numbers: Vec<TrackingNumber>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_shipment_copies_record_fields() {
        let record = ParsedInvoiceRecord {
            tracking_number: TrackingNumber::new("jd014600006281230704"),
            shipping_cost_cents: 1250,
            currency: "GBP".into(),
            service_type: Some("Express Worldwide".into()),
            weight_kg: Some(1.5),
            shipping_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            invoice_number: Some("INV-1".into()),
            source_row: 2,
        };
        let s = NewShipment::from_record(&record, Carrier::Dhl, CostProvenance::Actual, Some(7), None);
        assert_eq!(s.tracking_number.as_str(), "JD014600006281230704");
        assert_eq!(s.shipping_cost_cents, 1250);
        assert_eq!(s.order_id, Some(7));
        assert_eq!(s.weight_kg, Some(1.5));
    }
}
