// SQLite-backed store

use std::error::Error;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use freightrecon_core::{Carrier, CostProvenance, ExistingShipment, NewShipment, Order, ParsedInvoiceRecord, TrackingNumber, UploadMode};
use freightrecon_recon::{
    CostWrite, NewUnmatched, NewUploadHistory, OrderLookup, Page, Resolution, ShipmentLookup, ShipmentStore,
    StoreError, UnmatchedFilter, UnmatchedRecord, UnmatchedStatus, UnmatchedStore, UploadCounts, UploadHistory,
    UploadLedger, WriteOutcome,
};

use crate::schema::SCHEMA;

pub struct SqliteStore {
    pub(crate) conn: Connection,
}

pub(crate) fn db(e: rusqlite::Error) -> StoreError {
    StoreError::backend(e)
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::backend)?;
        }
        let conn = Connection::open(path).map_err(db)?;
        log::info!("opened ledger database {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(db)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
        conn.execute_batch(SCHEMA).map_err(db)?;
        Ok(Self { conn })
    }

    /// Seed a shipment as-is, lock flag and version included.
    pub fn add_shipment(&mut self, s: &ExistingShipment) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO shipments (tracking_number, carrier, order_id, shipping_cost_cents, currency, cost_locked, cost_provenance, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    s.tracking_number.as_str(),
                    s.carrier.code(),
                    s.order_id,
                    s.shipping_cost_cents,
                    s.currency,
                    s.cost_locked,
                    s.cost_provenance.as_str(),
                    s.version,
                ],
            )
            .map_err(db)?;
        Ok(())
    }

    pub fn account_id(&self, tracking: &TrackingNumber, carrier: Carrier) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT account_id FROM shipments WHERE tracking_number = ?1 AND carrier = ?2",
                params![tracking.as_str(), carrier.code()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
            .map_err(db)
    }

    fn orders_where(&self, clause: &str, param: &dyn ToSql) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT id, order_number, platform_order_id, customer_name FROM orders WHERE {clause} ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db)?;
        let mut orders = stmt
            .query_map(params![param], |row| {
                Ok(Order {
                    id: row.get(0)?,
                    order_number: row.get(1)?,
                    platform_order_id: row.get(2)?,
                    customer_name: row.get(3)?,
                    tracking_numbers: Vec::new(),
                })
            })
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;

        let mut tracking = self
            .conn
            .prepare("SELECT tracking_number FROM order_tracking WHERE order_id = ?1 ORDER BY tracking_number")
            .map_err(db)?;
        for order in &mut orders {
            order.tracking_numbers = tracking
                .query_map(params![order.id], |row| row.get::<_, String>(0))
                .map_err(db)?
                .map(|r| r.map(TrackingNumber::from))
                .collect::<Result<Vec<_>, _>>()
                .map_err(db)?;
        }
        Ok(orders)
    }

    fn first_order(&self, clause: &str, param: &dyn ToSql) -> Result<Option<Order>, StoreError> {
        Ok(self.orders_where(clause, param)?.into_iter().next())
    }
}

// ---------------------------------------------------------------------------
// Shared writes (plain connection or open transaction)
// ---------------------------------------------------------------------------

fn insert_shipment(conn: &Connection, s: &NewShipment) -> Result<ExistingShipment, StoreError> {
    let result = conn.execute(
        "INSERT INTO shipments (tracking_number, carrier, order_id, shipping_cost_cents, currency, cost_locked,
                                cost_provenance, account_id, service_type, weight_kg, shipping_date, version)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?10, 1)",
        params![
            s.tracking_number.as_str(),
            s.carrier.code(),
            s.order_id,
            s.shipping_cost_cents,
            s.currency,
            s.cost_provenance.as_str(),
            s.account_id,
            s.service_type,
            s.weight_kg,
            date_text(s.shipping_date),
        ],
    );
    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            return Err(StoreError::Conflict(format!(
                "shipment {} ({}) already exists",
                s.tracking_number, s.carrier
            )));
        }
        Err(e) => return Err(db(e)),
    }
    Ok(ExistingShipment {
        tracking_number: s.tracking_number.clone(),
        carrier: s.carrier,
        order_id: s.order_id,
        shipping_cost_cents: s.shipping_cost_cents,
        currency: s.currency.clone(),
        cost_locked: false,
        cost_provenance: s.cost_provenance,
        version: 1,
    })
}

fn save_resolution(conn: &Connection, id: i64, res: &Resolution) -> Result<bool, StoreError> {
    let changed = conn
        .execute(
            "UPDATE unmatched_invoice_records
             SET status = ?1, resolved_at = ?2, resolved_by = ?3, notes = ?4, matched_order_id = ?5
             WHERE id = ?6 AND status = 'pending'",
            params![
                res.status.as_str(),
                ts(&res.resolved_at),
                res.resolved_by,
                res.notes,
                res.matched_order_id,
                id,
            ],
        )
        .map_err(db)?;
    Ok(changed == 1)
}

// ---------------------------------------------------------------------------
// Column conversions
// ---------------------------------------------------------------------------

fn conversion<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion(idx, e))
}

fn opt_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => NaiveDate::from_str(&s).map(Some).map_err(|e| conversion(idx, e)),
        None => Ok(None),
    }
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Fixed-width RFC 3339 so text order is time order.
pub(crate) fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn date_text(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

const SHIPMENT_COLS: &str =
    "tracking_number, carrier, order_id, shipping_cost_cents, currency, cost_locked, cost_provenance, version";

fn shipment_row(row: &Row<'_>) -> rusqlite::Result<ExistingShipment> {
    Ok(ExistingShipment {
        tracking_number: TrackingNumber::from(row.get::<_, String>(0)?),
        carrier: parse_col::<Carrier>(row, 1)?,
        order_id: row.get(2)?,
        shipping_cost_cents: row.get(3)?,
        currency: row.get(4)?,
        cost_locked: row.get(5)?,
        cost_provenance: parse_col::<CostProvenance>(row, 6)?,
        version: row.get(7)?,
    })
}

const UNMATCHED_COLS: &str = "id, carrier, tracking_number, shipping_cost_cents, currency, service_type, weight_kg, \
     shipping_date, invoice_number, source_row, raw_record, source_file, status, resolved_at, resolved_by, notes, \
     matched_order_id, created_at";

fn unmatched_row(row: &Row<'_>) -> rusqlite::Result<UnmatchedRecord> {
    let raw: String = row.get(10)?;
    Ok(UnmatchedRecord {
        id: row.get(0)?,
        carrier: parse_col(row, 1)?,
        record: ParsedInvoiceRecord {
            tracking_number: TrackingNumber::from(row.get::<_, String>(2)?),
            shipping_cost_cents: row.get(3)?,
            currency: row.get(4)?,
            service_type: row.get(5)?,
            weight_kg: row.get(6)?,
            shipping_date: opt_date(row, 7)?,
            invoice_number: row.get(8)?,
            source_row: row.get::<_, i64>(9)? as usize,
        },
        raw: serde_json::from_str(&raw).map_err(|e| conversion(10, e))?,
        source_file: row.get(11)?,
        status: parse_col::<UnmatchedStatus>(row, 12)?,
        resolved_at: opt_timestamp(row, 13)?,
        resolved_by: row.get(14)?,
        notes: row.get(15)?,
        matched_order_id: row.get(16)?,
        created_at: timestamp(row, 17)?,
    })
}

const UPLOAD_COLS: &str = "id, carrier, mode, file_name, digest, uploaded_by, uploaded_at, \
     created, updated, added, skipped, blocked, errored, total";

fn upload_row(row: &Row<'_>) -> rusqlite::Result<UploadHistory> {
    let count = |idx: usize| row.get::<_, i64>(idx).map(|n| n as usize);
    Ok(UploadHistory {
        id: row.get(0)?,
        carrier: parse_col::<Carrier>(row, 1)?,
        mode: parse_col::<UploadMode>(row, 2)?,
        file_name: row.get(3)?,
        digest: row.get(4)?,
        uploaded_by: row.get(5)?,
        uploaded_at: timestamp(row, 6)?,
        counts: UploadCounts {
            created: count(7)?,
            updated: count(8)?,
            added: count(9)?,
            skipped: count(10)?,
            blocked: count(11)?,
            errored: count(12)?,
        },
        total: count(13)?,
    })
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

impl OrderLookup for SqliteStore {
    fn order_by_id(&self, id: i64) -> Result<Option<Order>, StoreError> {
        self.first_order("id = ?1", &id)
    }

    fn order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        self.first_order("order_number = ?1", &order_number)
    }

    fn order_by_platform_id(&self, platform_order_id: &str) -> Result<Option<Order>, StoreError> {
        self.first_order("platform_order_id = ?1", &platform_order_id)
    }

    fn orders_by_customer(&self, fragment: &str) -> Result<Vec<Order>, StoreError> {
        self.orders_where("instr(lower(customer_name), lower(?1)) > 0", &fragment)
    }

    fn order_for_tracking(&self, tracking: &TrackingNumber) -> Result<Option<Order>, StoreError> {
        self.first_order(
            "id IN (SELECT order_id FROM order_tracking WHERE tracking_number = ?1)",
            &tracking.as_str(),
        )
    }
}

impl ShipmentLookup for SqliteStore {
    fn shipment(&self, tracking: &TrackingNumber, carrier: Carrier) -> Result<Option<ExistingShipment>, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {SHIPMENT_COLS} FROM shipments WHERE tracking_number = ?1 AND carrier = ?2"),
                params![tracking.as_str(), carrier.code()],
                shipment_row,
            )
            .optional()
            .map_err(db)
    }
}

impl ShipmentStore for SqliteStore {
    fn is_locked(&self, tracking: &TrackingNumber, carrier: Carrier) -> Result<Option<bool>, StoreError> {
        self.conn
            .query_row(
                "SELECT cost_locked FROM shipments WHERE tracking_number = ?1 AND carrier = ?2",
                params![tracking.as_str(), carrier.code()],
                |row| row.get::<_, bool>(0),
            )
            .optional()
            .map_err(db)
    }

    fn insert_shipment(&mut self, s: &NewShipment) -> Result<ExistingShipment, StoreError> {
        insert_shipment(&self.conn, s)
    }

    fn write_cost(
        &mut self,
        tracking: &TrackingNumber,
        carrier: Carrier,
        write: CostWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE shipments
                 SET shipping_cost_cents = ?1, cost_provenance = ?2, version = version + 1
                 WHERE tracking_number = ?3 AND carrier = ?4 AND cost_locked = 0 AND version = ?5",
                params![
                    write.cost_cents,
                    write.provenance.as_str(),
                    tracking.as_str(),
                    carrier.code(),
                    write.expected_version,
                ],
            )
            .map_err(db)?;
        if changed == 1 {
            return Ok(WriteOutcome::Applied { version: write.expected_version + 1 });
        }

        // Nothing written: say why
        let state = self
            .conn
            .query_row(
                "SELECT cost_locked, version FROM shipments WHERE tracking_number = ?1 AND carrier = ?2",
                params![tracking.as_str(), carrier.code()],
                |row| Ok((row.get::<_, bool>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(db)?;
        Ok(match state {
            None => WriteOutcome::Missing,
            Some((true, _)) => WriteOutcome::Locked,
            Some((false, current_version)) => WriteOutcome::Stale { current_version },
        })
    }

    fn set_locked(&mut self, tracking: &TrackingNumber, carrier: Carrier, locked: bool) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE shipments SET cost_locked = ?1 WHERE tracking_number = ?2 AND carrier = ?3",
                params![locked, tracking.as_str(), carrier.code()],
            )
            .map_err(db)?;
        Ok(changed > 0)
    }
}

impl UnmatchedStore for SqliteStore {
    fn insert_unmatched(&mut self, u: &NewUnmatched) -> Result<i64, StoreError> {
        let raw = serde_json::to_string(&u.raw).map_err(StoreError::backend)?;
        let r = &u.record;
        self.conn
            .execute(
                "INSERT INTO unmatched_invoice_records
                    (carrier, tracking_number, shipping_cost_cents, currency, service_type, weight_kg, shipping_date,
                     invoice_number, source_row, raw_record, source_file, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending', ?12)",
                params![
                    u.carrier.code(),
                    r.tracking_number.as_str(),
                    r.shipping_cost_cents,
                    r.currency,
                    r.service_type,
                    r.weight_kg,
                    date_text(r.shipping_date),
                    r.invoice_number,
                    r.source_row as i64,
                    raw,
                    u.source_file,
                    ts(&u.created_at),
                ],
            )
            .map_err(db)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn unmatched(&self, id: i64) -> Result<Option<UnmatchedRecord>, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {UNMATCHED_COLS} FROM unmatched_invoice_records WHERE id = ?1"),
                params![id],
                unmatched_row,
            )
            .optional()
            .map_err(db)
    }

    fn list_unmatched(&self, filter: &UnmatchedFilter) -> Result<Page<UnmatchedRecord>, StoreError> {
        const WHERE: &str = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR carrier = ?2)";
        let status = filter.status.map(|s| s.as_str());
        let carrier = filter.carrier.map(|c| c.code());

        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM unmatched_invoice_records WHERE {WHERE}"),
                params![status, carrier],
                |row| row.get(0),
            )
            .map_err(db)?;

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {UNMATCHED_COLS} FROM unmatched_invoice_records WHERE {WHERE}
                 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4"
            ))
            .map_err(db)?;
        // SQLite takes signed bounds; anything past i64::MAX is "all" anyway
        let limit = i64::try_from(filter.per_page).unwrap_or(i64::MAX);
        let offset = i64::try_from(filter.offset()).unwrap_or(i64::MAX);
        let items = stmt
            .query_map(
                params![status, carrier, limit, offset],
                unmatched_row,
            )
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;

        Ok(Page {
            items,
            total: total as usize,
            page: filter.page,
            per_page: filter.per_page,
        })
    }

    fn pending_unmatched(&self) -> Result<Vec<UnmatchedRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {UNMATCHED_COLS} FROM unmatched_invoice_records WHERE status = 'pending' ORDER BY id"
            ))
            .map_err(db)?;
        let rows = stmt
            .query_map(params![], unmatched_row)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(rows)
    }

    fn save_resolution(&mut self, id: i64, res: &Resolution) -> Result<bool, StoreError> {
        save_resolution(&self.conn, id, res)
    }

    fn resolve_with_shipment(&mut self, id: i64, shipment: &NewShipment, res: &Resolution) -> Result<bool, StoreError> {
        // dropping tx without commit rolls both statements back
        let tx = self.conn.transaction().map_err(db)?;
        if !save_resolution(&tx, id, res)? {
            return Ok(false);
        }
        insert_shipment(&tx, shipment)?;
        tx.commit().map_err(db)?;
        Ok(true)
    }

    fn delete_unmatched(&mut self, ids: &[i64]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction().map_err(db)?;
        let mut deleted = 0;
        {
            let mut stmt = tx
                .prepare("DELETE FROM unmatched_invoice_records WHERE id = ?1")
                .map_err(db)?;
            for id in ids {
                deleted += stmt.execute(params![id]).map_err(db)?;
            }
        }
        tx.commit().map_err(db)?;
        Ok(deleted)
    }
}

impl UploadLedger for SqliteStore {
    fn record_upload(&mut self, u: &NewUploadHistory) -> Result<UploadHistory, StoreError> {
        let c = &u.counts;
        self.conn
            .execute(
                "INSERT INTO upload_history
                    (carrier, mode, file_name, digest, uploaded_by, uploaded_at,
                     created, updated, added, skipped, blocked, errored, total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    u.carrier.code(),
                    u.mode.as_str(),
                    u.file_name,
                    u.digest,
                    u.uploaded_by,
                    ts(&u.uploaded_at),
                    c.created as i64,
                    c.updated as i64,
                    c.added as i64,
                    c.skipped as i64,
                    c.blocked as i64,
                    c.errored as i64,
                    u.total as i64,
                ],
            )
            .map_err(db)?;
        Ok(UploadHistory::from_new(self.conn.last_insert_rowid(), u))
    }

    fn find_upload(&self, carrier: Carrier, digest: &str) -> Result<Option<UploadHistory>, StoreError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {UPLOAD_COLS} FROM upload_history WHERE carrier = ?1 AND digest = ?2 ORDER BY id DESC LIMIT 1"
                ),
                params![carrier.code(), digest],
                upload_row,
            )
            .optional()
            .map_err(db)
    }

    fn recent_uploads(&self, limit: usize) -> Result<Vec<UploadHistory>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {UPLOAD_COLS} FROM upload_history ORDER BY id DESC LIMIT ?1"))
            .map_err(db)?;
        let rows = stmt
            .query_map(params![limit as i64], upload_row)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(rows)
    }
}
