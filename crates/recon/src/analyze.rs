//! Read-only preview: parse, map, normalize and decide every record.

use serde::Serialize;

use freightrecon_core::{Carrier, CostProvenance, ExistingShipment, UploadMode};
use freightrecon_io::{digest, read_table, FileKind, RawTable};

use crate::context::ReconContext;
use crate::decision::{decide, Action, Decision, DecisionInput, DecisionReason};
use crate::error::ReconError;
use crate::fields::SemanticField;
use crate::mapper::{map_columns, ColumnMapping, ManualMapping};
use crate::normalize::{normalize, DropCounts, InvoiceLine};
use crate::store::{OrderLookup, ShipmentLookup, UploadLedger};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub carrier: Carrier,
    pub mode: UploadMode,
    pub manual: ManualMapping,
}

/// Returned instead of decisions while tracking or cost is unmapped.
#[derive(Debug, Clone, Serialize)]
pub struct MappingReport {
    pub file_kind: FileKind,
    pub headers: Vec<String>,
    pub mapping: ColumnMapping,
    pub missing: Vec<SemanticField>,
    /// First few rows, for picking columns by eye.
    pub sample_rows: Vec<Vec<String>>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordDecision {
    #[serde(flatten)]
    pub line: InvoiceLine,
    pub decision: Decision,
    /// Human-readable reason.
    pub message: String,
    /// Shipment row version the decision was made against; commit refuses
    /// to write if the row has moved on since.
    pub observed_version: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisTotals {
    pub records: usize,
    pub create: usize,
    pub update: usize,
    pub add: usize,
    pub skip: usize,
    pub blocked: usize,
    /// Skips that will land in the unmatched queue.
    pub unmatched: usize,
    pub invoice_total_cents: i64,
    /// Net cost change across update and add decisions.
    pub cost_change_cents: i64,
}

impl AnalysisTotals {
    fn tally(&mut self, line: &InvoiceLine, d: &Decision) {
        self.records += 1;
        self.invoice_total_cents += line.record.shipping_cost_cents;
        match d.action {
            Action::Create => self.create += 1,
            Action::Update => self.update += 1,
            Action::Add => self.add += 1,
            Action::Skip => self.skip += 1,
            Action::Blocked => self.blocked += 1,
        }
        if d.reason == DecisionReason::NoMatchingOrder {
            self.unmatched += 1;
        }
        match d.action {
            Action::Update => self.cost_change_cents += d.cost_difference_cents.unwrap_or(0),
            Action::Add => self.cost_change_cents += line.record.shipping_cost_cents,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub carrier: Carrier,
    pub mode: UploadMode,
    pub file_name: Option<String>,
    pub file_kind: FileKind,
    pub digest: String,
    pub mapping: ColumnMapping,
    pub records: Vec<RecordDecision>,
    pub totals: AnalysisTotals,
    pub drops: DropCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    NeedsMapping(MappingReport),
    Ready(AnalysisReport),
}

const SAMPLE_ROWS: usize = 5;

/// Analyze an upload without touching storage. Safe to repeat.
pub fn analyze<S>(store: &S, ctx: &ReconContext, req: &UploadRequest) -> Result<Analysis, ReconError>
where
    S: OrderLookup + ShipmentLookup + UploadLedger + ?Sized,
{
    let (file_kind, table) = read_table(&req.bytes, req.file_name.as_deref(), &ctx.pdf)?;
    let template = ctx.carriers.template(req.carrier);
    let mapping = map_columns(&table.headers, &template.header_synonyms, &req.manual)?;

    let mut warnings = table.warnings.clone();
    if let Some(detected) = ctx.carriers.detect_from_headers(&table.headers) {
        if detected != req.carrier {
            warnings.push(format!(
                "column headers look like a {} invoice, not {}",
                detected.display_name(),
                req.carrier.display_name()
            ));
        }
    }

    let missing = mapping.missing_required();
    if !missing.is_empty() {
        log::info!("mapping incomplete: missing {:?}", missing);
        return Ok(Analysis::NeedsMapping(MappingReport {
            file_kind,
            headers: table.headers.clone(),
            sample_rows: sample(&table),
            mapping,
            missing,
            warnings,
        }));
    }

    let normalized = normalize(&table, &mapping, template, &ctx.carriers, &ctx.default_currency)?;
    warnings.extend(normalized.warnings);

    let digest = digest(&req.bytes);
    if let Some(prior) = store.find_upload(req.carrier, &digest)? {
        warnings.push(format!(
            "this file was already committed as upload #{} on {}",
            prior.id,
            prior.uploaded_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    let provenance = template.provenance;
    let mut totals = AnalysisTotals::default();
    let mut records = Vec::with_capacity(normalized.lines.len());
    for line in normalized.lines {
        let (decision, snapshot) = decide_against(store, req.carrier, provenance, req.mode, &line)?;
        totals.tally(&line, &decision);
        records.push(RecordDecision {
            message: decision.reason.to_string(),
            observed_version: snapshot.map(|s| s.version),
            line,
            decision,
        });
    }

    log::info!(
        "analyzed {} record(s) for {}: {} create, {} update, {} add, {} skip, {} blocked",
        totals.records,
        req.carrier,
        totals.create,
        totals.update,
        totals.add,
        totals.skip,
        totals.blocked
    );

    Ok(Analysis::Ready(AnalysisReport {
        carrier: req.carrier,
        mode: req.mode,
        file_name: req.file_name.clone(),
        file_kind,
        digest,
        mapping,
        records,
        totals,
        drops: normalized.drops,
        warnings,
    }))
}

/// Snapshot the shipment (and, if absent, the order) and decide. The
/// snapshot is returned so a write can be guarded on its version.
pub(crate) fn decide_against<S>(
    store: &S,
    carrier: Carrier,
    provenance: CostProvenance,
    mode: UploadMode,
    line: &InvoiceLine,
) -> Result<(Decision, Option<ExistingShipment>), ReconError>
where
    S: OrderLookup + ShipmentLookup + ?Sized,
{
    let tracking = &line.record.tracking_number;
    let existing = store.shipment(tracking, carrier)?;
    let order = match existing {
        Some(_) => None,
        None => store.order_for_tracking(tracking)?,
    };
    let decision = decide(DecisionInput {
        record: &line.record,
        incoming_provenance: provenance,
        existing: existing.as_ref(),
        order: order.as_ref(),
        mode,
    });
    log::debug!(
        "row {} {}: {} ({})",
        line.record.source_row,
        tracking,
        decision.action,
        decision.reason
    );
    Ok((decision, existing))
}

fn sample(table: &RawTable) -> Vec<Vec<String>> {
    table.rows.iter().take(SAMPLE_ROWS).map(|r| r.cells.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightrecon_core::{Order, TrackingNumber};

    use crate::memory::MemoryStore;
    use crate::store::ShipmentStore;

    fn request(csv: &str, carrier: Carrier, mode: UploadMode) -> UploadRequest {
        UploadRequest {
            bytes: csv.as_bytes().to_vec(),
            file_name: Some("invoice.csv".into()),
            carrier,
            mode,
            manual: ManualMapping::new(),
        }
    }

    fn ready(a: Analysis) -> AnalysisReport {
        match a {
            Analysis::Ready(r) => r,
            Analysis::NeedsMapping(m) => panic!("needs mapping: {:?}", m.missing),
        }
    }

    fn store() -> MemoryStore {
        let mut s = MemoryStore::new();
        s.add_order(Order {
            id: 1,
            order_number: "A-1".into(),
            platform_order_id: None,
            customer_name: "Ann".into(),
            tracking_numbers: vec![TrackingNumber::new("1234567891")],
        });
        s.add_shipment(ExistingShipment {
            tracking_number: TrackingNumber::new("1234567890"),
            carrier: Carrier::Dhl,
            order_id: Some(1),
            shipping_cost_cents: 1000,
            currency: "GBP".into(),
            cost_locked: false,
            cost_provenance: CostProvenance::Actual,
            version: 1,
        });
        s
    }

    #[test]
    fn preview_decides_each_record_without_writing() {
        let s = store();
        let csv = "AWB Number,Total Amount (excl. VAT),XC1 Charge\n\
                   1234567890,12.50,1.00\n\
                   1234567891,8.00,0\n\
                   1234567899,3.00,0\n\
                   ,4.00,0\n";
        let report = ready(analyze(&s, &ReconContext::default(), &request(csv, Carrier::Dhl, UploadMode::OverwriteAll)).unwrap());

        let actions: Vec<Action> = report.records.iter().map(|r| r.decision.action).collect();
        assert_eq!(actions, [Action::Update, Action::Create, Action::Skip]);
        assert_eq!(report.totals.records, 3);
        assert_eq!(report.totals.unmatched, 1);
        assert_eq!(report.totals.cost_change_cents, 250);
        assert_eq!(report.totals.invoice_total_cents, 2350);
        assert_eq!(report.drops.missing_tracking, 1);
        assert_eq!(report.mapping.get(SemanticField::Cost).unwrap().header, "Total Amount (excl. VAT)");
        assert_eq!(report.records[2].message, "no matching order");
        assert_eq!(report.digest.len(), 64);

        // nothing written
        let existing = s.shipment(&TrackingNumber::new("1234567890"), Carrier::Dhl).unwrap().unwrap();
        assert_eq!(existing.shipping_cost_cents, 1000);
        assert_eq!(s.shipment_count(), 1);
        assert!(s.is_locked(&TrackingNumber::new("1234567891"), Carrier::Dhl).unwrap().is_none());
    }

    #[test]
    fn unmapped_file_asks_for_mapping() {
        let csv = "Ref,Foo\nX,Y\n";
        let a = analyze(&store(), &ReconContext::default(), &request(csv, Carrier::Dhl, UploadMode::AddOnly)).unwrap();
        match a {
            Analysis::NeedsMapping(m) => {
                assert_eq!(m.missing, vec![SemanticField::Tracking, SemanticField::Cost]);
                assert_eq!(m.headers, ["Ref", "Foo"]);
                assert_eq!(m.sample_rows, vec![vec!["X".to_string(), "Y".to_string()]]);
            }
            Analysis::Ready(_) => panic!("expected NeedsMapping"),
        }
    }

    #[test]
    fn manual_mapping_completes_analysis() {
        let csv = "Ref,Foo\n1234567890,11.00\n";
        let mut req = request(csv, Carrier::Dhl, UploadMode::UpdateIfHigher);
        req.manual = ManualMapping::parse(&["tracking=Ref", "cost=#1"]).unwrap();
        let report = ready(analyze(&store(), &ReconContext::default(), &req).unwrap());
        assert_eq!(report.records[0].decision.action, Action::Update);
    }

    #[test]
    fn warns_when_headers_belong_to_another_carrier() {
        let csv = "Express or Ground Tracking ID,Net Charge Amount\n123456789012,9.00\n";
        let report = ready(analyze(&store(), &ReconContext::default(), &request(csv, Carrier::Dhl, UploadMode::AddOnly)).unwrap());
        assert!(
            report.warnings.iter().any(|w| w.contains("look like a FedEx invoice")),
            "{:?}",
            report.warnings
        );
    }

    #[test]
    fn unsupported_file_is_a_format_error() {
        let mut req = request("", Carrier::Dhl, UploadMode::AddOnly);
        req.bytes = vec![0x00, 0x01, 0x02];
        req.file_name = Some("x.bin".into());
        assert!(matches!(analyze(&store(), &ReconContext::default(), &req), Err(ReconError::Format(_))));
    }
}
