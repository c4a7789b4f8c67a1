//! `frecon analyze` and `frecon commit`.

use freightrecon_recon::{
    analyze, commit, Analysis, AnalysisReport, CommitOptions, CommitReport, ManualMapping, MappingReport,
    UploadRequest,
};

use crate::exit_codes::{EXIT_MAPPING_INCOMPLETE, EXIT_PARTIAL_COMMIT};
use crate::util::{money, signed_cents, Align, Table};
use crate::{print_json, CliError, Session, UploadArgs};

fn request(args: &UploadArgs) -> Result<UploadRequest, CliError> {
    let manual = ManualMapping::parse(&args.map[..])?;
    let bytes = std::fs::read(&args.file)
        .map_err(|e| CliError::io(format!("cannot read {}: {}", args.file.display(), e)))?;
    Ok(UploadRequest {
        bytes,
        file_name: args.file.file_name().map(|n| n.to_string_lossy().into_owned()),
        carrier: args.carrier,
        mode: args.mode,
        manual,
    })
}

pub fn cmd_analyze(session: &Session, args: UploadArgs) -> Result<(), CliError> {
    let req = request(&args)?;
    let store = session.store()?;
    let analysis = analyze(&store, &session.ctx, &req)?;

    if args.json {
        print_json(&analysis)?;
    }
    match analysis {
        Analysis::NeedsMapping(m) => {
            if !args.json {
                print_mapping(&m);
            }
            Err(CliError::silent(EXIT_MAPPING_INCOMPLETE))
        }
        Analysis::Ready(report) => {
            if !args.json {
                print_analysis(&report);
            }
            Ok(())
        }
    }
}

pub fn cmd_commit(session: &Session, args: UploadArgs, user: Option<String>, force: bool) -> Result<(), CliError> {
    let req = request(&args)?;
    let mut store = session.store()?;

    let report = match analyze(&store, &session.ctx, &req)? {
        Analysis::Ready(report) => report,
        Analysis::NeedsMapping(m) => {
            if args.json {
                print_json(&Analysis::NeedsMapping(m.clone()))?;
            } else {
                print_mapping(&m);
            }
            return Err(freightrecon_recon::ReconError::MappingIncomplete(m.missing).into());
        }
    };

    let opts = CommitOptions { uploaded_by: user, force };
    let out = commit(&mut store, &session.ctx, &report, &opts)?;

    if args.json {
        print_json(&out)?;
    } else {
        print_commit(&out);
    }

    let errored = out.errored().count();
    if errored > 0 {
        return Err(CliError {
            code: EXIT_PARTIAL_COMMIT,
            message: format!("{} of {} record(s) errored", errored, out.records.len()),
            hint: Some(format!("upload #{} is recorded; fix and re-run with --force", out.upload.id)),
        });
    }
    Ok(())
}

fn print_mapping(m: &MappingReport) {
    eprintln!("file type: {}", m.file_kind.as_str());
    eprintln!("headers:");
    for (i, h) in m.headers.iter().enumerate() {
        let assigned: Vec<&str> = m
            .mapping
            .fields
            .iter()
            .filter(|(_, fm)| fm.column == i)
            .map(|(f, _)| f.as_str())
            .collect();
        if assigned.is_empty() {
            eprintln!("  [{}] {}", i, h);
        } else {
            eprintln!("  [{}] {}  <- {}", i, h, assigned.join(", "));
        }
    }
    if !m.sample_rows.is_empty() {
        eprintln!("first rows:");
        for row in &m.sample_rows {
            eprintln!("  {}", row.join(" | "));
        }
    }
    for w in &m.warnings {
        eprintln!("warning: {}", w);
    }
    let missing: Vec<&str> = m.missing.iter().map(|f| f.as_str()).collect();
    eprintln!("not mapped: {}", missing.join(", "));
    eprintln!("hint:  pass --map FIELD=COLUMN (name or index) for each, then run again");
}

fn print_analysis(r: &AnalysisReport) {
    let mut table = Table::new(&[
        ("ROW", Align::Right, 6),
        ("TRACKING", Align::Left, 24),
        ("INVOICE", Align::Right, 16),
        ("ACTION", Align::Left, 7),
        ("DIFF", Align::Right, 12),
        ("REASON", Align::Left, 60),
    ]);
    for rd in &r.records {
        let rec = &rd.line.record;
        table.row(vec![
            rec.source_row.to_string(),
            rec.tracking_number.to_string(),
            money(rec.shipping_cost_cents, &rec.currency),
            rd.decision.action.to_string(),
            rd.decision.cost_difference_cents.map(signed_cents).unwrap_or_default(),
            rd.message.clone(),
        ]);
    }
    print!("{}", table.render());

    let t = &r.totals;
    eprintln!(
        "{} {} record(s) ({}): {} create, {} update, {} add, {} skip ({} unmatched), {} blocked",
        r.carrier.display_name(),
        t.records,
        r.mode,
        t.create,
        t.update,
        t.add,
        t.skip,
        t.unmatched,
        t.blocked
    );
    eprintln!(
        "invoice total {}, cost change {}",
        freightrecon_core::format_cents(t.invoice_total_cents),
        signed_cents(t.cost_change_cents)
    );
    for w in &r.warnings {
        eprintln!("warning: {}", w);
    }
}

fn print_commit(out: &CommitReport) {
    let mut table = Table::new(&[
        ("ROW", Align::Right, 6),
        ("TRACKING", Align::Left, 24),
        ("OUTCOME", Align::Left, 8),
        ("QUEUED", Align::Right, 8),
        ("MESSAGE", Align::Left, 70),
    ]);
    for r in &out.records {
        table.row(vec![
            r.source_row.to_string(),
            r.tracking_number.to_string(),
            r.outcome.as_str().to_string(),
            r.unmatched_id.map(|id| format!("#{id}")).unwrap_or_default(),
            r.message.clone(),
        ]);
    }
    print!("{}", table.render());

    let u = &out.upload;
    let c = &u.counts;
    eprintln!(
        "upload #{}: {} created, {} updated, {} added, {} skipped, {} blocked, {} errored (total {})",
        u.id, c.created, c.updated, c.added, c.skipped, c.blocked, c.errored, u.total
    );
    for w in &out.warnings {
        eprintln!("warning: {}", w);
    }
}
