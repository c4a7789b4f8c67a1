pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY,
    order_number TEXT NOT NULL,
    platform_order_id TEXT,
    customer_name TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_orders_number ON orders(order_number);
CREATE INDEX IF NOT EXISTS idx_orders_platform ON orders(platform_order_id);

CREATE TABLE IF NOT EXISTS order_tracking (
    order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    tracking_number TEXT NOT NULL,     -- normalized: trimmed, upper-case
    PRIMARY KEY (order_id, tracking_number)
);
CREATE INDEX IF NOT EXISTS idx_order_tracking_number ON order_tracking(tracking_number);

CREATE TABLE IF NOT EXISTS shipments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tracking_number TEXT NOT NULL,
    carrier TEXT NOT NULL,             -- carrier code, e.g. royal_mail
    order_id INTEGER,
    shipping_cost_cents INTEGER NOT NULL,
    currency TEXT NOT NULL,
    cost_locked INTEGER NOT NULL DEFAULT 0,
    cost_provenance TEXT NOT NULL,     -- actual | estimated
    account_id TEXT,
    service_type TEXT,
    weight_kg REAL,
    shipping_date TEXT,                -- YYYY-MM-DD
    version INTEGER NOT NULL DEFAULT 1,
    UNIQUE (tracking_number, carrier)
);

CREATE TABLE IF NOT EXISTS unmatched_invoice_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    carrier TEXT NOT NULL,
    tracking_number TEXT NOT NULL,
    shipping_cost_cents INTEGER NOT NULL,
    currency TEXT NOT NULL,
    service_type TEXT,
    weight_kg REAL,
    shipping_date TEXT,
    invoice_number TEXT,
    source_row INTEGER NOT NULL,
    raw_record TEXT NOT NULL,          -- JSON object, header -> cell
    source_file TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    resolved_at TEXT,
    resolved_by TEXT,
    notes TEXT,
    matched_order_id INTEGER,
    created_at TEXT NOT NULL           -- RFC 3339, UTC, fixed width
);
CREATE INDEX IF NOT EXISTS idx_unmatched_status ON unmatched_invoice_records(status);

CREATE TABLE IF NOT EXISTS upload_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    carrier TEXT NOT NULL,
    mode TEXT NOT NULL,
    file_name TEXT,
    digest TEXT NOT NULL,              -- sha256 hex of the uploaded bytes
    uploaded_by TEXT,
    uploaded_at TEXT NOT NULL,
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    added INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    blocked INTEGER NOT NULL,
    errored INTEGER NOT NULL,
    total INTEGER NOT NULL,
    CHECK (created + updated + added + skipped + blocked + errored = total)
);
CREATE INDEX IF NOT EXISTS idx_upload_digest ON upload_history(carrier, digest);
"#;
