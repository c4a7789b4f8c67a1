use chrono::NaiveDate;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

use freightrecon_core::{Carrier, CostProvenance, ExistingShipment, Order, TrackingNumber, UploadMode};
use freightrecon_recon::{
    analyze, analyze_and_commit, commit, unmatched, Action, Analysis, AnalysisReport, CommitOptions, ManualMapping,
    MemoryStore, Outcome, ReconContext, ShipmentLookup, UnmatchedFilter, UnmatchedStatus, UnmatchedStore,
    UploadLedger, UploadRequest,
};

fn tracking(i: usize) -> String {
    format!("{:010}", 4_000_000_000usize + i)
}

fn shipment(t: &str, carrier: Carrier, cents: i64, locked: bool, provenance: CostProvenance) -> ExistingShipment {
    ExistingShipment {
        tracking_number: TrackingNumber::new(t),
        carrier,
        order_id: None,
        shipping_cost_cents: cents,
        currency: "GBP".into(),
        cost_locked: locked,
        cost_provenance: provenance,
        version: 1,
    }
}

fn ready(store: &MemoryStore, ctx: &ReconContext, req: &UploadRequest) -> AnalysisReport {
    match analyze(store, ctx, req).unwrap() {
        Analysis::Ready(r) => r,
        Analysis::NeedsMapping(m) => panic!("mapping incomplete: {:?}", m.missing),
    }
}

// -------------------------------------------------------------------------
// End to end
// -------------------------------------------------------------------------

/// 100 rows: 60 existing shipments with a changed cost, 5 locked ones,
/// 20 new shipments for known orders and 15 orphans.
#[test]
fn hundred_record_upload_balances() {
    let mut store = MemoryStore::new();
    let mut csv = String::from("Invoice Number,AWB Number,Shipment Date,Product Name,Weight (kg),Total Amount (excl. VAT),XC1 Charge\n");

    for i in 0..100 {
        let t = tracking(i);
        match i {
            0..=59 => store.add_shipment(shipment(&t, Carrier::Dhl, 1000, false, CostProvenance::Actual)),
            60..=64 => store.add_shipment(shipment(&t, Carrier::Dhl, 1000, true, CostProvenance::Actual)),
            65..=84 => store.add_order(Order {
                id: i as i64,
                order_number: format!("ORD-{i}"),
                platform_order_id: None,
                customer_name: format!("Customer {i}"),
                tracking_numbers: vec![TrackingNumber::new(&t)],
            }),
            _ => {}
        }
        csv.push_str(&format!("INV-77,{t},01/03/2024,EXPRESS WORLDWIDE,1.5,\"£1,012.00\",2.50\n"));
    }

    let ctx = ReconContext::default();
    let req = UploadRequest {
        bytes: csv.into_bytes(),
        file_name: Some("dhl-2024-03.csv".into()),
        carrier: Carrier::Dhl,
        mode: UploadMode::OverwriteAll,
        manual: ManualMapping::new(),
    };

    let report = ready(&store, &ctx, &req);
    assert_eq!(report.totals.update, 60);
    assert_eq!(report.totals.create, 20);
    assert_eq!(report.totals.skip, 15);
    assert_eq!(report.totals.blocked, 5);
    assert_eq!(report.totals.unmatched, 15);

    let first = &report.records[0].line.record;
    assert_eq!(first.shipping_cost_cents, 101_200);
    assert_eq!(first.shipping_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(first.service_type.as_deref(), Some("EXPRESS WORLDWIDE"));
    assert_eq!(first.weight_kg, Some(1.5));
    assert_eq!(first.invoice_number.as_deref(), Some("INV-77"));

    let out = commit(&mut store, &ctx, &report, &CommitOptions { uploaded_by: Some("ops".into()), force: false }).unwrap();
    let h = &out.upload;
    assert_eq!((h.counts.updated, h.counts.created, h.counts.skipped, h.counts.blocked), (60, 20, 15, 5));
    assert_eq!(h.counts.errored, 0);
    assert_eq!(h.counts.sum(), 100);
    assert_eq!(h.total, 100);

    let stored = store.recent_uploads(5).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].digest, report.digest);

    let locked = store.shipment(&TrackingNumber::new(&tracking(60)), Carrier::Dhl).unwrap().unwrap();
    assert_eq!(locked.shipping_cost_cents, 1000);
    let updated = store.shipment(&TrackingNumber::new(&tracking(0)), Carrier::Dhl).unwrap().unwrap();
    assert_eq!(updated.shipping_cost_cents, 101_200);

    let queue = store
        .list_unmatched(&UnmatchedFilter { status: Some(UnmatchedStatus::Pending), ..Default::default() })
        .unwrap();
    assert_eq!(queue.total, 15);
}

#[test]
fn preview_then_commit_after_lock() {
    let mut store = MemoryStore::new();
    store.add_shipment(shipment("1234567890", Carrier::Dhl, 500, false, CostProvenance::Estimated));
    let ctx = ReconContext::default();
    let req = UploadRequest {
        bytes: b"AWB Number,Total Charge\n1234567890,7.25\n".to_vec(),
        file_name: None,
        carrier: Carrier::Dhl,
        mode: UploadMode::UpdateIfHigher,
        manual: ManualMapping::new(),
    };

    let report = ready(&store, &ctx, &req);
    assert_eq!(report.records[0].decision.action, Action::Update);

    freightrecon_recon::ShipmentStore::set_locked(&mut store, &TrackingNumber::new("1234567890"), Carrier::Dhl, true).unwrap();

    let out = commit(&mut store, &ctx, &report, &CommitOptions::default()).unwrap();
    assert_eq!(out.records[0].outcome, Outcome::Blocked);
    assert_eq!(out.records[0].message, "manual override protected");
}

// -------------------------------------------------------------------------
// Spreadsheet + provenance
// -------------------------------------------------------------------------

fn royal_mail_xlsx() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    let date_fmt = Format::new().set_num_format("dd/mm/yyyy");
    for (col, h) in ["Item ID", "Product Description", "Posting Date", "Weight (g)", "Price"].iter().enumerate() {
        ws.write_string(0, col as u16, *h).unwrap();
    }
    let rows = [("AB123456789GB", 4.10), ("CD987654321GB", 2.95)];
    for (i, (id, price)) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        ws.write_string(r, 0, *id).unwrap();
        ws.write_string(r, 1, "Tracked 48").unwrap();
        let date = ExcelDateTime::from_ymd(2024, 4, 2).unwrap();
        ws.write_datetime_with_format(r, 2, &date, &date_fmt).unwrap();
        ws.write_number(r, 3, 1250.0).unwrap();
        ws.write_number(r, 4, *price).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

#[test]
fn estimated_carrier_never_overwrites_actual() {
    let mut store = MemoryStore::new();
    store.add_shipment(shipment("AB123456789GB", Carrier::RoyalMail, 300, false, CostProvenance::Actual));
    store.add_shipment(shipment("CD987654321GB", Carrier::RoyalMail, 300, false, CostProvenance::Estimated));

    let req = UploadRequest {
        bytes: royal_mail_xlsx(),
        file_name: Some("royal-mail.xlsx".into()),
        carrier: Carrier::RoyalMail,
        mode: UploadMode::OverwriteAll,
        manual: ManualMapping::new(),
    };
    let out = analyze_and_commit(&mut store, &ReconContext::default(), &req, &CommitOptions::default()).unwrap();

    assert_eq!(out.records[0].outcome, Outcome::Blocked);
    assert_eq!(out.records[0].message, "cannot overwrite verified actual cost with an estimate");
    assert_eq!(out.records[1].outcome, Outcome::Updated);

    let s = store.shipment(&TrackingNumber::new("CD987654321GB"), Carrier::RoyalMail).unwrap().unwrap();
    assert_eq!(s.shipping_cost_cents, 295);
    assert_eq!(s.cost_provenance, CostProvenance::Estimated);
}

#[test]
fn spreadsheet_fields_are_typed() {
    let store = MemoryStore::new();
    let req = UploadRequest {
        bytes: royal_mail_xlsx(),
        file_name: Some("royal-mail.xlsx".into()),
        carrier: Carrier::RoyalMail,
        mode: UploadMode::AddOnly,
        manual: ManualMapping::new(),
    };
    let report = ready(&store, &ReconContext::default(), &req);
    let r = &report.records[0].line.record;
    assert_eq!(r.shipping_date, NaiveDate::from_ymd_opt(2024, 4, 2));
    assert_eq!(r.weight_kg, Some(1.25));
    assert_eq!(r.service_type.as_deref(), Some("Tracked 48"));
    assert_eq!(r.shipping_cost_cents, 410);
    assert_eq!(r.currency, "GBP");
}

// -------------------------------------------------------------------------
// Unmatched queue round trip
// -------------------------------------------------------------------------

#[test]
fn orphan_is_queued_then_matched_to_order() {
    let mut store = MemoryStore::new();
    let ctx = ReconContext::default();
    let req = UploadRequest {
        bytes: b"Tracking Number,Net Amount\n1Z999AA10123456784,$15.40\n".to_vec(),
        file_name: Some("ups.csv".into()),
        carrier: Carrier::Ups,
        mode: UploadMode::AddOnly,
        manual: ManualMapping::new(),
    };
    let out = analyze_and_commit(&mut store, &ctx, &req, &CommitOptions::default()).unwrap();
    let id = out.records[0].unmatched_id.expect("queued");

    store.add_order(Order {
        id: 31,
        order_number: "1031".into(),
        platform_order_id: Some("gid://shop/Order/99".into()),
        customer_name: "Margaret Hamilton".into(),
        tracking_numbers: vec![],
    });

    let update = unmatched::StatusUpdate {
        status: Some(UnmatchedStatus::Matched),
        order: Some("hamilton".into()),
        notes: None,
        actor: Some("ops".into()),
    };
    let rec = unmatched::update_status(&mut store, &ctx, id, &update, chrono::Utc::now()).unwrap();
    assert_eq!(rec.matched_order_id, Some(31));

    let s = store.shipment(&TrackingNumber::new("1Z999AA10123456784"), Carrier::Ups).unwrap().unwrap();
    assert_eq!(s.order_id, Some(31));
    assert_eq!(s.shipping_cost_cents, 1540);
    assert_eq!(s.currency, "USD");
    assert!(store.pending_unmatched().unwrap().is_empty());
}
