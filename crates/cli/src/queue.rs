//! `frecon unmatched`: the manual resolution queue.

use clap::Subcommand;

use freightrecon_core::Carrier;
use freightrecon_recon::{unmatched, StatusUpdate, UnmatchedFilter, UnmatchedRecord, UnmatchedStatus};

use crate::util::{money, Align, Table};
use crate::{print_json, CliError, Session};

#[derive(Subcommand)]
pub enum UnmatchedCommands {
    /// List queued records, newest first
    #[command(after_help = "\
Examples:
  frecon unmatched list
  frecon unmatched list --status pending --carrier ups --page 2
  frecon unmatched list --json | jq '.items[].tracking_number'")]
    List {
        #[arg(long)]
        status: Option<UnmatchedStatus>,

        #[arg(long)]
        carrier: Option<Carrier>,

        /// 1-based
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 50)]
        per_page: usize,

        #[arg(long)]
        json: bool,
    },

    /// Resolve a pending record
    #[command(after_help = "\
Matching creates the shipment from the queued invoice line.

Examples:
  frecon unmatched update 12 --status matched --order 1031
  frecon unmatched update 12 --status matched --order hamilton --user ops
  frecon unmatched update 14 --status voided --notes \"credit note\"")]
    Update {
        id: i64,

        /// matched, voided or resolved
        #[arg(long)]
        status: UnmatchedStatus,

        /// Order id, order number, platform order id, or customer name fragment
        #[arg(long)]
        order: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Delete a record regardless of status
    Delete { id: i64 },

    /// Remove pending duplicates (same tracking, invoice number and cost), keeping the earliest
    Dedupe {
        #[arg(long)]
        json: bool,
    },
}

pub fn cmd_unmatched(session: &Session, cmd: UnmatchedCommands) -> Result<(), CliError> {
    match cmd {
        UnmatchedCommands::List { status, carrier, page, per_page, json } => {
            if page == 0 || per_page == 0 {
                return Err(CliError::args("--page and --per-page start at 1"));
            }
            let store = session.store()?;
            let filter = UnmatchedFilter { status, carrier, page, per_page };
            let result = unmatched::list(&store, &filter)?;
            if json {
                return print_json(&result);
            }
            print!("{}", render_records(&result.items));
            let pages = result.total.div_ceil(result.per_page).max(1);
            eprintln!("{} record(s), page {} of {}", result.total, result.page, pages);
            Ok(())
        }
        UnmatchedCommands::Update { id, status, order, notes, user, json } => {
            let mut store = session.store()?;
            let update = StatusUpdate { status: Some(status), order, notes, actor: user };
            let rec = unmatched::update_status(&mut store, &session.ctx, id, &update, chrono::Utc::now())?;
            if json {
                return print_json(&rec);
            }
            match rec.matched_order_id {
                Some(order_id) => eprintln!("#{} {} -> order {}", rec.id, rec.status, order_id),
                None => eprintln!("#{} {}", rec.id, rec.status),
            }
            Ok(())
        }
        UnmatchedCommands::Delete { id } => {
            let mut store = session.store()?;
            unmatched::delete(&mut store, id)?;
            eprintln!("deleted #{}", id);
            Ok(())
        }
        UnmatchedCommands::Dedupe { json } => {
            let mut store = session.store()?;
            let report = unmatched::dedupe(&mut store)?;
            if json {
                return print_json(&report);
            }
            eprintln!(
                "{} duplicate group(s): kept {}, deleted {}",
                report.groups,
                report.kept.len(),
                report.deleted.len()
            );
            Ok(())
        }
    }
}

fn render_records(items: &[UnmatchedRecord]) -> String {
    let mut table = Table::new(&[
        ("ID", Align::Right, 8),
        ("CARRIER", Align::Left, 10),
        ("TRACKING", Align::Left, 24),
        ("COST", Align::Right, 16),
        ("INVOICE", Align::Left, 16),
        ("STATUS", Align::Left, 8),
        ("CREATED", Align::Left, 16),
        ("FILE", Align::Left, 30),
    ]);
    for r in items {
        table.row(vec![
            r.id.to_string(),
            r.carrier.code().to_string(),
            r.record.tracking_number.to_string(),
            money(r.record.shipping_cost_cents, &r.record.currency),
            r.record.invoice_number.clone().unwrap_or_default(),
            r.status.to_string(),
            r.created_at.format("%Y-%m-%d %H:%M").to_string(),
            r.source_file.clone().unwrap_or_default(),
        ]);
    }
    table.render()
}
