//! Apply an analysis to storage, one isolated record at a time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use freightrecon_core::{Carrier, CostProvenance, NewShipment, TrackingNumber, UploadMode};

use crate::analyze::{analyze, decide_against, Analysis, AnalysisReport, RecordDecision, UploadRequest};
use crate::context::ReconContext;
use crate::decision::{Action, Decision, DecisionReason};
use crate::error::ReconError;
use crate::ledger::{NewUploadHistory, Outcome, UploadCounts, UploadHistory};
use crate::store::{CostWrite, ReconStore, StoreError, WriteOutcome};
use crate::unmatched::NewUnmatched;

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub uploaded_by: Option<String>,
    /// Commit even if this exact file was committed before.
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommittedRecord {
    pub source_row: usize,
    pub tracking_number: TrackingNumber,
    pub outcome: Outcome,
    /// Decision re-made at commit time; absent if the snapshot read failed.
    pub decision: Option<Decision>,
    pub message: String,
    pub unmatched_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub upload: UploadHistory,
    pub records: Vec<CommittedRecord>,
    pub warnings: Vec<String>,
}

impl CommitReport {
    pub fn errored(&self) -> impl Iterator<Item = &CommittedRecord> {
        self.records.iter().filter(|r| r.outcome == Outcome::Errored)
    }
}

/// Everything one record write needs besides the line itself.
struct Batch<'a> {
    ctx: &'a ReconContext,
    carrier: Carrier,
    mode: UploadMode,
    provenance: CostProvenance,
    file_name: Option<&'a str>,
    now: DateTime<Utc>,
}

/// Commit an analysis. Every record is re-decided against current state,
/// and a record whose shipment moved since analysis is `errored`.
pub fn commit<S: ReconStore + ?Sized>(
    store: &mut S,
    ctx: &ReconContext,
    report: &AnalysisReport,
    opts: &CommitOptions,
) -> Result<CommitReport, ReconError> {
    if let Some(prior) = store.find_upload(report.carrier, &report.digest)? {
        if !opts.force {
            return Err(ReconError::DuplicateUpload {
                carrier: report.carrier,
                upload_id: prior.id,
                uploaded_at: prior.uploaded_at,
            });
        }
        log::warn!("re-committing file already recorded as upload #{}", prior.id);
    }

    let now = Utc::now();
    let batch = Batch {
        ctx,
        carrier: report.carrier,
        mode: report.mode,
        provenance: ctx.carriers.provenance(report.carrier),
        file_name: report.file_name.as_deref(),
        now,
    };

    let mut records = Vec::with_capacity(report.records.len());
    // Versions this batch itself produced, so repeated tracking numbers in
    // one file chain on each other instead of reading as concurrent edits.
    let mut written: BTreeMap<TrackingNumber, i64> = BTreeMap::new();
    for rd in &report.records {
        let line = &rd.line;
        let committed = match commit_one(store, &batch, rd, &mut written) {
            Ok(c) => c,
            Err(e) => {
                log::warn!(
                    "row {} {}: {}",
                    line.record.source_row,
                    line.record.tracking_number,
                    e
                );
                CommittedRecord {
                    source_row: line.record.source_row,
                    tracking_number: line.record.tracking_number.clone(),
                    outcome: Outcome::Errored,
                    decision: None,
                    message: e.to_string(),
                    unmatched_id: None,
                }
            }
        };
        records.push(committed);
    }

    let counts: UploadCounts = records.iter().map(|r| r.outcome).collect();
    let history = NewUploadHistory::new(
        report.carrier,
        report.mode,
        report.file_name.clone(),
        report.digest.clone(),
        opts.uploaded_by.clone(),
        now,
        counts,
        records.len(),
    )?;
    let upload = store.record_upload(&history)?;

    log::info!(
        "upload #{} committed: {} created, {} updated, {} added, {} skipped, {} blocked, {} errored",
        upload.id,
        counts.created,
        counts.updated,
        counts.added,
        counts.skipped,
        counts.blocked,
        counts.errored
    );

    Ok(CommitReport {
        upload,
        records,
        warnings: report.warnings.clone(),
    })
}

/// Analyze then commit. An incomplete mapping is an error here.
pub fn analyze_and_commit<S: ReconStore + ?Sized>(
    store: &mut S,
    ctx: &ReconContext,
    req: &UploadRequest,
    opts: &CommitOptions,
) -> Result<CommitReport, ReconError> {
    match analyze(&*store, ctx, req)? {
        Analysis::Ready(report) => commit(store, ctx, &report, opts),
        Analysis::NeedsMapping(m) => Err(ReconError::MappingIncomplete(m.missing)),
    }
}

fn commit_one<S: ReconStore + ?Sized>(
    store: &mut S,
    batch: &Batch<'_>,
    previewed: &RecordDecision,
    written: &mut BTreeMap<TrackingNumber, i64>,
) -> Result<CommittedRecord, StoreError> {
    let line = &previewed.line;
    let record = &line.record;
    let tracking = &record.tracking_number;

    let (decision, snapshot) = match decide_against(&*store, batch.carrier, batch.provenance, batch.mode, line) {
        Ok(d) => d,
        Err(ReconError::Store(e)) => return Err(e),
        Err(other) => return Err(StoreError::Conflict(other.to_string())),
    };
    check_unchanged(previewed, &decision, snapshot.as_ref().map(|s| s.version), written.get(tracking).copied())?;

    let mut unmatched_id = None;
    let (outcome, decision, message) = match decision.action {
        Action::Skip => {
            if decision.reason == DecisionReason::NoMatchingOrder {
                let id = store.insert_unmatched(&NewUnmatched {
                    carrier: batch.carrier,
                    record: record.clone(),
                    raw: line.raw.clone(),
                    source_file: batch.file_name.map(str::to_string),
                    created_at: batch.now,
                })?;
                unmatched_id = Some(id);
            }
            let msg = decision.reason.to_string();
            (Outcome::Skipped, decision, msg)
        }
        Action::Blocked => {
            let msg = decision.reason.to_string();
            (Outcome::Blocked, decision, msg)
        }
        Action::Create => {
            let template = batch.ctx.carriers.template(batch.carrier);
            let shipment = NewShipment::from_record(
                record,
                batch.carrier,
                batch.provenance,
                decision.order_id,
                template.account_id.clone(),
            );
            let created = store.insert_shipment(&shipment)?;
            written.insert(tracking.clone(), created.version);
            let msg = decision.reason.to_string();
            (Outcome::Created, decision, msg)
        }
        Action::Update | Action::Add => {
            let expected_version = snapshot.map(|s| s.version).ok_or_else(|| {
                StoreError::Conflict(format!("shipment {tracking} disappeared during commit"))
            })?;
            let (outcome, decision, msg, version) = write_existing(store, batch, tracking, decision, expected_version)?;
            if let Some(v) = version {
                written.insert(tracking.clone(), v);
            }
            (outcome, decision, msg)
        }
    };

    log::debug!("row {} {}: {}", record.source_row, tracking, outcome);
    Ok(CommittedRecord {
        source_row: record.source_row,
        tracking_number: tracking.clone(),
        outcome,
        decision: Some(decision),
        message,
        unmatched_id,
    })
}

/// Refuse to act on a record whose shipment changed between analysis and
/// commit. A lock is honoured as `blocked` regardless; a record that still
/// won't write and decides as previewed passes. Rows after a write by this
/// same batch are checked against that write's version and may re-decide.
fn check_unchanged(
    previewed: &RecordDecision,
    decision: &Decision,
    current: Option<i64>,
    batch_version: Option<i64>,
) -> Result<(), StoreError> {
    if decision.action == Action::Blocked {
        return Ok(());
    }
    if !decision.action.writes() && decision.action == previewed.decision.action {
        return Ok(());
    }
    let tracking = &previewed.line.record.tracking_number;
    let expected = batch_version.or(previewed.observed_version);
    if current != expected {
        return Err(StoreError::Conflict(format!(
            "stale write: shipment {tracking} changed since analysis (version {} -> {})",
            version_text(expected),
            version_text(current)
        )));
    }
    if batch_version.is_none() && current.is_some() && decision.action != previewed.decision.action {
        return Err(StoreError::Conflict(format!(
            "stale write: shipment {tracking} changed since analysis (previewed {}, now {})",
            previewed.decision.action, decision.action
        )));
    }
    Ok(())
}

fn version_text(v: Option<i64>) -> String {
    v.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// Lock re-read, then the lock- and version-guarded write.
fn write_existing<S: ReconStore + ?Sized>(
    store: &mut S,
    batch: &Batch<'_>,
    tracking: &TrackingNumber,
    decision: Decision,
    expected_version: i64,
) -> Result<(Outcome, Decision, String, Option<i64>), StoreError> {
    match store.is_locked(tracking, batch.carrier)? {
        Some(true) => {
            let d = decision.locked_at_write();
            let msg = d.reason.to_string();
            return Ok((Outcome::Blocked, d, msg, None));
        }
        Some(false) => {}
        None => return Err(StoreError::Conflict(format!("shipment {tracking} disappeared during commit"))),
    }

    let (Some(cost_cents), Some(provenance)) = (decision.resulting_cost_cents, decision.provenance) else {
        return Err(StoreError::Conflict(format!("no cost to write for {tracking}")));
    };
    let write = CostWrite {
        cost_cents,
        provenance,
        expected_version,
    };
    match store.write_cost(tracking, batch.carrier, write)? {
        WriteOutcome::Applied { version } => {
            let outcome = if decision.action == Action::Add { Outcome::Added } else { Outcome::Updated };
            let msg = decision.reason.to_string();
            Ok((outcome, decision, msg, Some(version)))
        }
        WriteOutcome::Locked => {
            let d = decision.locked_at_write();
            let msg = d.reason.to_string();
            Ok((Outcome::Blocked, d, msg, None))
        }
        WriteOutcome::Stale { current_version } => Err(StoreError::Conflict(format!(
            "stale write: shipment {tracking} moved from version {expected_version} to {current_version}"
        ))),
        WriteOutcome::Missing => Err(StoreError::Conflict(format!("shipment {tracking} disappeared during commit"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightrecon_core::{ExistingShipment, Order};

    use crate::memory::MemoryStore;
    use crate::store::{OrderLookup, ShipmentLookup, ShipmentStore, UnmatchedStore, UploadLedger};
    use crate::mapper::ManualMapping;

    const CSV: &str = "AWB Number,Total Amount (excl. VAT)\n\
                       1234567890,12.50\n\
                       1234567891,8.00\n\
                       1234567899,3.00\n";

    fn request(mode: UploadMode) -> UploadRequest {
        UploadRequest {
            bytes: CSV.as_bytes().to_vec(),
            file_name: Some("dhl-march.csv".into()),
            carrier: Carrier::Dhl,
            mode,
            manual: ManualMapping::new(),
        }
    }

    fn seeded() -> MemoryStore {
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

    fn ready(store: &MemoryStore, ctx: &ReconContext, mode: UploadMode) -> AnalysisReport {
        match analyze(store, ctx, &request(mode)).unwrap() {
            Analysis::Ready(r) => r,
            Analysis::NeedsMapping(_) => panic!("mapping incomplete"),
        }
    }

    fn t(s: &str) -> TrackingNumber {
        TrackingNumber::new(s)
    }

    #[test]
    fn commit_writes_and_records_history() {
        let mut store = seeded();
        let mut ctx = ReconContext::default();
        ctx.carriers
            .apply_override(
                Carrier::Dhl,
                &crate::carriers::CarrierOverride {
                    account_id: Some("DHL-UK-01".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let report = ready(&store, &ctx, UploadMode::OverwriteAll);
        let out = commit(
            &mut store,
            &ctx,
            &report,
            &CommitOptions { uploaded_by: Some("sam".into()), force: false },
        )
        .unwrap();

        let outcomes: Vec<Outcome> = out.records.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, [Outcome::Updated, Outcome::Created, Outcome::Skipped]);
        assert_eq!(out.upload.counts.sum(), out.upload.total);
        assert_eq!(out.upload.total, 3);
        assert_eq!(out.upload.uploaded_by.as_deref(), Some("sam"));

        let updated = store.shipment(&t("1234567890"), Carrier::Dhl).unwrap().unwrap();
        assert_eq!((updated.shipping_cost_cents, updated.version), (1250, 2));

        let created = store.shipment(&t("1234567891"), Carrier::Dhl).unwrap().unwrap();
        assert_eq!(created.order_id, Some(1));
        assert_eq!(created.cost_provenance, CostProvenance::Actual);
        assert_eq!(store.account_id(&t("1234567891"), Carrier::Dhl), Some("DHL-UK-01"));

        let unmatched_id = out.records[2].unmatched_id.unwrap();
        let queued = store.unmatched(unmatched_id).unwrap().unwrap();
        assert_eq!(queued.record.tracking_number, t("1234567899"));
        assert_eq!(queued.raw["AWB Number"], "1234567899");
        assert_eq!(queued.source_file.as_deref(), Some("dhl-march.csv"));
    }

    #[test]
    fn duplicate_upload_rejected_unless_forced() {
        let mut store = seeded();
        let ctx = ReconContext::default();
        analyze_and_commit(&mut store, &ctx, &request(UploadMode::AddOnly), &CommitOptions::default()).unwrap();

        let err = analyze_and_commit(&mut store, &ctx, &request(UploadMode::AddOnly), &CommitOptions::default()).unwrap_err();
        assert!(matches!(err, ReconError::DuplicateUpload { upload_id: 1, .. }));

        let forced = analyze_and_commit(
            &mut store,
            &ctx,
            &request(UploadMode::AddOnly),
            &CommitOptions { force: true, ..Default::default() },
        )
        .unwrap();
        assert_eq!(forced.upload.id, 2);
        assert_eq!(store.recent_uploads(10).unwrap().len(), 2);
    }

    #[test]
    fn lock_set_after_analysis_blocks_at_commit() {
        let mut store = seeded();
        let ctx = ReconContext::default();
        let report = ready(&store, &ctx, UploadMode::OverwriteAll);
        assert_eq!(report.records[0].decision.action, Action::Update);

        store.set_locked(&t("1234567890"), Carrier::Dhl, true).unwrap();
        let out = commit(&mut store, &ctx, &report, &CommitOptions::default()).unwrap();
        assert_eq!(out.records[0].outcome, Outcome::Blocked);
        assert_eq!(out.upload.counts.blocked, 1);
        assert_eq!(store.shipment(&t("1234567890"), Carrier::Dhl).unwrap().unwrap().shipping_cost_cents, 1000);
    }

    #[test]
    fn duplicates_within_a_file_see_earlier_writes() {
        let mut store = seeded();
        let ctx = ReconContext::default();
        let mut req = request(UploadMode::AddToExisting);
        req.bytes = b"AWB Number,Total Amount (excl. VAT)\n1234567890,1.00\n1234567890,2.00\n".to_vec();
        let out = analyze_and_commit(&mut store, &ctx, &req, &CommitOptions::default()).unwrap();
        assert_eq!(out.upload.counts.added, 2);
        let s = store.shipment(&t("1234567890"), Carrier::Dhl).unwrap().unwrap();
        assert_eq!((s.shipping_cost_cents, s.version), (1300, 3));
    }

    #[test]
    fn lock_cleared_after_analysis_is_stale() {
        let mut store = seeded();
        let ctx = ReconContext::default();
        store.set_locked(&t("1234567890"), Carrier::Dhl, true).unwrap();
        let report = ready(&store, &ctx, UploadMode::OverwriteAll);
        assert_eq!(report.records[0].decision.action, Action::Blocked);

        store.set_locked(&t("1234567890"), Carrier::Dhl, false).unwrap();
        let out = commit(&mut store, &ctx, &report, &CommitOptions::default()).unwrap();
        assert_eq!(out.records[0].outcome, Outcome::Errored);
        assert!(out.records[0].message.contains("changed since analysis"), "{}", out.records[0].message);
        assert_eq!(out.records[1].outcome, Outcome::Created);
        assert_eq!(store.shipment(&t("1234567890"), Carrier::Dhl).unwrap().unwrap().shipping_cost_cents, 1000);
    }

    #[test]
    fn cost_edited_after_analysis_is_stale() {
        let mut store = seeded();
        let ctx = ReconContext::default();
        let report = ready(&store, &ctx, UploadMode::OverwriteAll);
        assert_eq!(report.records[0].observed_version, Some(1));

        let edit = CostWrite { cost_cents: 1100, provenance: CostProvenance::Actual, expected_version: 1 };
        store.write_cost(&t("1234567890"), Carrier::Dhl, edit).unwrap();

        let out = commit(&mut store, &ctx, &report, &CommitOptions::default()).unwrap();
        assert_eq!(out.records[0].outcome, Outcome::Errored);
        assert!(out.records[0].message.contains("version 1 -> 2"), "{}", out.records[0].message);
        assert_eq!(out.upload.counts.sum(), 3);
        let s = store.shipment(&t("1234567890"), Carrier::Dhl).unwrap().unwrap();
        assert_eq!((s.shipping_cost_cents, s.version), (1100, 2));
    }

    #[test]
    fn repeated_rows_chain_on_their_own_writes() {
        let mut store = seeded();
        let ctx = ReconContext::default();
        let mut req = request(UploadMode::OverwriteAll);
        req.bytes = b"AWB Number,Total Amount (excl. VAT)\n\
                      1234567890,12.50\n1234567890,12.50\n\
                      1234567891,4.00\n1234567891,6.00\n"
            .to_vec();
        let out = analyze_and_commit(&mut store, &ctx, &req, &CommitOptions::default()).unwrap();

        let outcomes: Vec<Outcome> = out.records.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, [Outcome::Updated, Outcome::Skipped, Outcome::Created, Outcome::Updated]);
        assert_eq!(store.shipment(&t("1234567891"), Carrier::Dhl).unwrap().unwrap().shipping_cost_cents, 600);
    }

    #[test]
    fn incomplete_mapping_cannot_commit() {
        let mut store = seeded();
        let mut req = request(UploadMode::AddOnly);
        req.bytes = b"Ref,Foo\n1,2\n".to_vec();
        let err = analyze_and_commit(&mut store, &ReconContext::default(), &req, &CommitOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "required column(s) not mapped: tracking, cost");
    }

    /// Delegates to a [`MemoryStore`] but moves the row version between the
    /// snapshot and the write, as a concurrent editor would.
    struct RacingStore {
        inner: MemoryStore,
        racing_writer: bool,
    }

    impl OrderLookup for RacingStore {
        fn order_by_id(&self, id: i64) -> Result<Option<Order>, StoreError> {
            self.inner.order_by_id(id)
        }
        fn order_by_number(&self, n: &str) -> Result<Option<Order>, StoreError> {
            self.inner.order_by_number(n)
        }
        fn order_by_platform_id(&self, p: &str) -> Result<Option<Order>, StoreError> {
            self.inner.order_by_platform_id(p)
        }
        fn orders_by_customer(&self, f: &str) -> Result<Vec<Order>, StoreError> {
            self.inner.orders_by_customer(f)
        }
        fn order_for_tracking(&self, t: &TrackingNumber) -> Result<Option<Order>, StoreError> {
            self.inner.order_for_tracking(t)
        }
    }

    impl ShipmentLookup for RacingStore {
        fn shipment(&self, t: &TrackingNumber, c: Carrier) -> Result<Option<ExistingShipment>, StoreError> {
            self.inner.shipment(t, c)
        }
    }

    impl ShipmentStore for RacingStore {
        fn is_locked(&self, t: &TrackingNumber, c: Carrier) -> Result<Option<bool>, StoreError> {
            self.inner.is_locked(t, c)
        }
        fn insert_shipment(&mut self, s: &NewShipment) -> Result<ExistingShipment, StoreError> {
            self.inner.insert_shipment(s)
        }
        fn write_cost(&mut self, t: &TrackingNumber, c: Carrier, w: CostWrite) -> Result<WriteOutcome, StoreError> {
            if self.racing_writer {
                // another writer lands first
                let current = self.inner.shipment(t, c)?.map_or(0, |s| s.version);
                self.inner.write_cost(
                    t,
                    c,
                    CostWrite { cost_cents: 777, provenance: CostProvenance::Actual, expected_version: current },
                )?;
            }
            self.inner.write_cost(t, c, w)
        }
        fn set_locked(&mut self, t: &TrackingNumber, c: Carrier, locked: bool) -> Result<bool, StoreError> {
            self.inner.set_locked(t, c, locked)
        }
    }

    impl UnmatchedStore for RacingStore {
        fn insert_unmatched(&mut self, r: &NewUnmatched) -> Result<i64, StoreError> {
            self.inner.insert_unmatched(r)
        }
        fn unmatched(&self, id: i64) -> Result<Option<crate::unmatched::UnmatchedRecord>, StoreError> {
            self.inner.unmatched(id)
        }
        fn list_unmatched(
            &self,
            f: &crate::unmatched::UnmatchedFilter,
        ) -> Result<crate::unmatched::Page<crate::unmatched::UnmatchedRecord>, StoreError> {
            self.inner.list_unmatched(f)
        }
        fn pending_unmatched(&self) -> Result<Vec<crate::unmatched::UnmatchedRecord>, StoreError> {
            self.inner.pending_unmatched()
        }
        fn save_resolution(&mut self, id: i64, r: &crate::unmatched::Resolution) -> Result<bool, StoreError> {
            self.inner.save_resolution(id, r)
        }
        fn resolve_with_shipment(
            &mut self,
            id: i64,
            s: &NewShipment,
            r: &crate::unmatched::Resolution,
        ) -> Result<bool, StoreError> {
            self.inner.resolve_with_shipment(id, s, r)
        }
        fn delete_unmatched(&mut self, ids: &[i64]) -> Result<usize, StoreError> {
            self.inner.delete_unmatched(ids)
        }
    }

    impl UploadLedger for RacingStore {
        fn record_upload(&mut self, u: &NewUploadHistory) -> Result<UploadHistory, StoreError> {
            self.inner.record_upload(u)
        }
        fn find_upload(&self, c: Carrier, d: &str) -> Result<Option<UploadHistory>, StoreError> {
            self.inner.find_upload(c, d)
        }
        fn recent_uploads(&self, limit: usize) -> Result<Vec<UploadHistory>, StoreError> {
            self.inner.recent_uploads(limit)
        }
    }

    #[test]
    fn stale_version_is_errored_and_batch_continues() {
        let mut store = RacingStore { inner: seeded(), racing_writer: true };
        let ctx = ReconContext::default();
        let out = analyze_and_commit(&mut store, &ctx, &request(UploadMode::OverwriteAll), &CommitOptions::default()).unwrap();

        assert_eq!(out.records[0].outcome, Outcome::Errored);
        assert!(out.records[0].message.starts_with("conflict: stale write"), "{}", out.records[0].message);
        assert_eq!(out.records[1].outcome, Outcome::Created);
        assert_eq!(out.records[2].outcome, Outcome::Skipped);
        assert_eq!(out.upload.counts.errored, 1);
        assert_eq!(out.upload.counts.sum(), 3);
        assert_eq!(out.errored().count(), 1);

        // the concurrent writer's value survives
        let s = store.shipment(&t("1234567890"), Carrier::Dhl).unwrap().unwrap();
        assert_eq!(s.shipping_cost_cents, 777);
    }
}
