//! `frecon history`, `carriers`, `orders` and `shipments`.

use std::path::PathBuf;

use clap::Subcommand;

use freightrecon_core::{Carrier, TrackingNumber};
use freightrecon_recon::{CarrierSummary, ShipmentStore, UploadLedger};

use crate::exit_codes::EXIT_NOT_FOUND;
use crate::util::{Align, Table};
use crate::{print_json, CliError, Session};

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Load orders from CSV: id, order_number, platform_order_id, customer_name, tracking_numbers
    #[command(after_help = "\
tracking_numbers holds one or more tracking numbers separated by ';'.
Importing an order again replaces its tracking numbers.

Examples:
  frecon orders import shop-export.csv")]
    Import { file: PathBuf },
}

#[derive(Subcommand)]
pub enum ShipmentCommands {
    /// Protect a shipment's cost from reconciliation
    Lock {
        tracking: String,
        #[arg(long)]
        carrier: Carrier,
    },
    /// Let reconciliation change a shipment's cost again
    Unlock {
        tracking: String,
        #[arg(long)]
        carrier: Carrier,
    },
}

pub fn cmd_history(session: &Session, limit: usize, json: bool) -> Result<(), CliError> {
    let store = session.store()?;
    let uploads = store.recent_uploads(limit)?;
    if json {
        return print_json(&uploads);
    }

    let mut table = Table::new(&[
        ("ID", Align::Right, 8),
        ("UPLOADED", Align::Left, 16),
        ("CARRIER", Align::Left, 10),
        ("MODE", Align::Left, 16),
        ("CRE", Align::Right, 6),
        ("UPD", Align::Right, 6),
        ("ADD", Align::Right, 6),
        ("SKIP", Align::Right, 6),
        ("BLK", Align::Right, 6),
        ("ERR", Align::Right, 6),
        ("TOTAL", Align::Right, 7),
        ("BY", Align::Left, 12),
        ("FILE", Align::Left, 30),
    ]);
    for u in &uploads {
        let c = &u.counts;
        table.row(vec![
            u.id.to_string(),
            u.uploaded_at.format("%Y-%m-%d %H:%M").to_string(),
            u.carrier.code().to_string(),
            u.mode.to_string(),
            c.created.to_string(),
            c.updated.to_string(),
            c.added.to_string(),
            c.skipped.to_string(),
            c.blocked.to_string(),
            c.errored.to_string(),
            u.total.to_string(),
            u.uploaded_by.clone().unwrap_or_default(),
            u.file_name.clone().unwrap_or_default(),
        ]);
    }
    print!("{}", table.render());
    Ok(())
}

pub fn cmd_carriers(session: &Session, json: bool) -> Result<(), CliError> {
    let summaries: Vec<CarrierSummary> = session.ctx.carriers.templates().map(|t| t.summary()).collect();
    if json {
        return print_json(&summaries);
    }

    let mut table = Table::new(&[
        ("CODE", Align::Left, 12),
        ("NAME", Align::Left, 12),
        ("PROVENANCE", Align::Left, 10),
        ("ACCOUNT", Align::Left, 16),
        ("TRACKING PATTERNS", Align::Left, 80),
    ]);
    for s in &summaries {
        table.row(vec![
            s.carrier.code().to_string(),
            s.name.to_string(),
            s.provenance.to_string(),
            s.account_id.clone().unwrap_or_default(),
            s.tracking_patterns.join(" "),
        ]);
    }
    print!("{}", table.render());
    Ok(())
}

pub fn cmd_orders(session: &Session, cmd: OrderCommands) -> Result<(), CliError> {
    match cmd {
        OrderCommands::Import { file } => {
            let reader = std::fs::File::open(&file)
                .map_err(|e| CliError::io(format!("cannot read {}: {}", file.display(), e)))?;
            let mut store = session.store()?;
            let n = store.import_orders(reader)?;
            eprintln!("imported {} order(s) from {}", n, file.display());
            Ok(())
        }
    }
}

pub fn cmd_shipments(session: &Session, cmd: ShipmentCommands) -> Result<(), CliError> {
    let (tracking, carrier, locked) = match cmd {
        ShipmentCommands::Lock { tracking, carrier } => (tracking, carrier, true),
        ShipmentCommands::Unlock { tracking, carrier } => (tracking, carrier, false),
    };
    let tracking = TrackingNumber::new(&tracking);
    let mut store = session.store()?;
    if !store.set_locked(&tracking, carrier, locked)? {
        return Err(CliError {
            code: EXIT_NOT_FOUND,
            message: format!("no {} shipment {}", carrier.display_name(), tracking),
            hint: None,
        });
    }
    eprintln!(
        "{} {} ({})",
        if locked { "locked" } else { "unlocked" },
        tracking,
        carrier.code()
    );
    Ok(())
}
