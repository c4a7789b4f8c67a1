//! Orders import from CSV.
//!
//! Columns: `id, order_number, platform_order_id, customer_name, tracking_numbers`
//! where `tracking_numbers` is `;`-separated. Re-importing an order replaces its
//! tracking numbers.

use std::io::Read;

use rusqlite::params;
use serde::Deserialize;

use freightrecon_core::TrackingNumber;
use freightrecon_recon::StoreError;

use crate::sqlite::{db, SqliteStore};

#[derive(Debug, Deserialize)]
struct OrderRow {
    id: i64,
    order_number: String,
    #[serde(default)]
    platform_order_id: Option<String>,
    #[serde(default)]
    customer_name: String,
    #[serde(default)]
    tracking_numbers: String,
}

fn split_tracking(raw: &str) -> Vec<TrackingNumber> {
    let mut out: Vec<TrackingNumber> = raw
        .split(';')
        .map(TrackingNumber::new)
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

impl SqliteStore {
    /// Upsert every order in `reader`; returns how many rows were imported.
    /// The whole file is one transaction.
    pub fn import_orders<R: Read>(&mut self, reader: R) -> Result<usize, StoreError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let tx = self.conn.transaction().map_err(db)?;
        let mut count = 0;
        {
            let mut upsert = tx
                .prepare(
                    "INSERT INTO orders (id, order_number, platform_order_id, customer_name)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        order_number = excluded.order_number,
                        platform_order_id = excluded.platform_order_id,
                        customer_name = excluded.customer_name",
                )
                .map_err(db)?;
            let mut clear = tx.prepare("DELETE FROM order_tracking WHERE order_id = ?1").map_err(db)?;
            let mut link = tx
                .prepare("INSERT OR IGNORE INTO order_tracking (order_id, tracking_number) VALUES (?1, ?2)")
                .map_err(db)?;

            for (i, row) in rdr.deserialize::<OrderRow>().enumerate() {
                let row = row.map_err(|e| StoreError::Corrupt(format!("orders row {}: {}", i + 2, e)))?;
                let platform = row.platform_order_id.filter(|p| !p.is_empty());
                upsert
                    .execute(params![row.id, row.order_number, platform, row.customer_name])
                    .map_err(db)?;
                clear.execute(params![row.id]).map_err(db)?;
                for t in split_tracking(&row.tracking_numbers) {
                    link.execute(params![row.id, t.as_str()]).map_err(db)?;
                }
                count += 1;
            }
        }
        tx.commit().map_err(db)?;
        log::info!("imported {} orders", count);
        Ok(count)
    }
}
