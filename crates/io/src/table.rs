use serde::Serialize;
use serde_json::{Map, Value};

/// One data row, cells aligned with [`RawTable::headers`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRow {
    /// 1-based position in the source (CSV line, sheet row, PDF text line).
    pub line: usize,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new(line: usize, cells: Vec<String>) -> Self {
        Self { line, cells }
    }

    /// Cell at `idx`, or `""` past the end.
    pub fn get(&self, idx: usize) -> &str {
        self.cells.get(idx).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }

    /// Header → cell object in column order, for audit storage.
    pub fn to_record(&self, headers: &[String]) -> Value {
        let mut map = Map::new();
        for (i, h) in headers.iter().enumerate() {
            let key = if h.is_empty() { format!("column_{}", i + 1) } else { h.clone() };
            map.insert(key, Value::String(self.get(i).to_string()));
        }
        Value::Object(map)
    }
}

/// Format-agnostic output of every adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub warnings: Vec<String>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new(), warnings: Vec::new() }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Push a row, padding short rows to the header width.
    pub fn push_padded(&mut self, line: usize, mut cells: Vec<String>) {
        if cells.len() < self.headers.len() {
            cells.resize(self.headers.len(), String::new());
        }
        self.rows.push(RawRow::new(line, cells));
    }
}
