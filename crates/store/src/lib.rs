//! `freightrecon-store`: SQLite persistence for the reconciliation engine.
//!
//! [`SqliteStore`] implements every storage trait from `freightrecon-recon`,
//! so it can be handed straight to `analyze` and `commit`. Cost writes are
//! a single conditional `UPDATE` guarded by the lock flag and row version.

mod import;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;
