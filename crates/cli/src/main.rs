// frecon - carrier invoice ingestion and shipping cost reconciliation

mod exit_codes;
mod ledger;
mod queue;
mod upload;
mod util;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use freightrecon_config::{ConfigError, Settings};
use freightrecon_core::{Carrier, UploadMode};
use freightrecon_recon::{ReconContext, ReconError, StoreError};
use freightrecon_store::SqliteStore;

use exit_codes::{recon_exit_code, recon_hint, store_exit_code, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "frecon")]
#[command(about = "Ingest carrier invoices and reconcile shipping costs")]
#[command(version, long_version = long_version())]
struct Cli {
    /// Ledger database (default: platform data dir, or `database` in settings)
    #[arg(long, global = true, env = "FRECON_DB")]
    db: Option<PathBuf>,

    /// Settings file (default: platform config dir)
    #[arg(long, global = true, env = "FRECON_CONFIG")]
    config: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// File, carrier and mode shared by `analyze` and `commit`.
#[derive(clap::Args)]
pub(crate) struct UploadArgs {
    /// Invoice file (CSV, XLSX, XLS or PDF)
    pub file: PathBuf,

    /// Carrier that issued the invoice
    #[arg(long)]
    pub carrier: Carrier,

    /// add_only, overwrite_all, update_if_higher, update_if_lower or add_to_existing
    #[arg(long)]
    pub mode: UploadMode,

    /// Assign a column by hand, e.g. --map cost="Net Amount" or --map tracking=#3. Repeatable.
    #[arg(long = "map", value_name = "FIELD=COLUMN")]
    pub map: Vec<String>,

    /// Print the full report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview decisions for an invoice without writing anything
    #[command(after_help = "\
Examples:
  frecon analyze dhl-march.csv --carrier dhl --mode overwrite_all
  frecon analyze invoice.pdf --carrier ups --mode update_if_higher --json
  frecon analyze export.xlsx --carrier dpd --map cost=\"Net Value\"")]
    Analyze(UploadArgs),

    /// Analyze and apply an invoice to the ledger
    #[command(after_help = "\
Exit code 6 means the same file was already committed for this carrier.
Exit code 7 means the upload was recorded but some records errored.

Examples:
  frecon commit dhl-march.csv --carrier dhl --mode overwrite_all --user ops
  frecon commit dhl-march.csv --carrier dhl --mode overwrite_all --force")]
    Commit {
        #[command(flatten)]
        upload: UploadArgs,

        /// Recorded as the uploader in history
        #[arg(long)]
        user: Option<String>,

        /// Commit even if this file was committed before
        #[arg(long)]
        force: bool,
    },

    /// Invoice lines that matched no order or shipment
    #[command(subcommand)]
    Unmatched(queue::UnmatchedCommands),

    /// Recent uploads, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Carrier templates with provenance and account id
    Carriers {
        #[arg(long)]
        json: bool,
    },

    /// Order data used for matching
    #[command(subcommand)]
    Orders(ledger::OrderCommands),

    /// Manual cost locks
    #[command(subcommand)]
    Shipments(ledger::ShipmentCommands),
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("FRECON_COMMIT"), ")",
        "\ntarget:  ", env!("FRECON_TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let session = Session::new(cli.db, cli.config.as_deref())?;
    match cli.command {
        Commands::Analyze(args) => upload::cmd_analyze(&session, args),
        Commands::Commit { upload, user, force } => upload::cmd_commit(&session, upload, user, force),
        Commands::Unmatched(cmd) => queue::cmd_unmatched(&session, cmd),
        Commands::History { limit, json } => ledger::cmd_history(&session, limit, json),
        Commands::Carriers { json } => ledger::cmd_carriers(&session, json),
        Commands::Orders(cmd) => ledger::cmd_orders(&session, cmd),
        Commands::Shipments(cmd) => ledger::cmd_shipments(&session, cmd),
    }
}

/// Settings, context and database location for one invocation.
pub(crate) struct Session {
    pub ctx: ReconContext,
    pub db_path: PathBuf,
}

impl Session {
    fn new(db: Option<PathBuf>, config: Option<&Path>) -> Result<Self, CliError> {
        let settings = match config {
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        }
        .map_err(CliError::from)?;
        let ctx = settings.context().map_err(CliError::from)?;
        let db_path = db.unwrap_or_else(|| settings.database_path());
        Ok(Self { ctx, db_path })
    }

    /// Opened per command so `carriers` works without a database.
    pub fn store(&self) -> Result<SqliteStore, CliError> {
        SqliteStore::open(&self.db_path).map_err(|e| {
            CliError::from(e).with_hint(format!("database: {}", self.db_path.display()))
        })
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Exit with `code` without printing anything more; the command already reported.
    pub fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        Self {
            code: recon_exit_code(&err),
            hint: recon_hint(&err),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self { code: store_exit_code(&err), message: err.to_string(), hint: None }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Read { .. } | ConfigError::Parse { .. } => {
                Some(format!("default location: {}", Settings::config_path().display()))
            }
            _ => None,
        };
        Self { code: EXIT_ERROR, message: err.to_string(), hint }
    }
}

/// Write one JSON value to stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|e| CliError { code: EXIT_ERROR, message: format!("JSON serialization error: {e}"), hint: None })?;
    println!("{}", s);
    Ok(())
}
