// CSV/TSV invoice import

use crate::error::FormatError;
use crate::table::{RawRow, RawTable};

/// Parse a delimited-text invoice. The first non-blank record is the header.
///
/// Rows whose field count disagrees with the header are skipped with a
/// warning; trailing empty fields beyond the header width are tolerated.
pub fn read(bytes: &[u8]) -> Result<RawTable, FormatError> {
    let content = decode(bytes);
    if content.trim().is_empty() {
        return Err(FormatError::Empty);
    }
    let delimiter = sniff_delimiter(&content);
    log::debug!("csv: delimiter {:?}", delimiter as char);
    read_with_delimiter(&content, delimiter)
}

fn read_with_delimiter(content: &str, delimiter: u8) -> Result<RawTable, FormatError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut table = RawTable::default();
    let mut has_header = false;
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = result.map_err(|e| FormatError::Csv(e.to_string()))?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let mut cells: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();

        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        if !has_header {
            table.headers = cells;
            has_header = true;
            continue;
        }

        let width = table.width();
        while cells.len() > width && cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }
        if cells.len() != width {
            skipped += 1;
            table.warnings.push(format!(
                "line {line}: expected {width} fields, found {}; row skipped",
                cells.len()
            ));
            continue;
        }
        table.rows.push(RawRow::new(line, cells));
    }

    if !has_header {
        return Err(FormatError::MissingHeader);
    }
    if skipped > 0 {
        log::warn!("csv: {skipped} row(s) skipped for field-count mismatch");
    }
    Ok(table)
}

/// Pick the delimiter of a carrier invoice export.
///
/// European Excel saves use `;` with decimal-comma amounts, some carrier
/// portals emit `|` or tab, everything else is `,`. The header row decides
/// the column count; a candidate scores by how many of the first data rows
/// agree with it. Decimal commas split amount cells unevenly, so the wrong
/// comma reading loses on agreement even when it yields more fields.
fn sniff_delimiter(content: &str) -> u8 {
    const CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

    let mut lines = content.lines().filter(|l| !l.trim().is_empty()).take(10);
    let Some(header) = lines.next() else {
        return b',';
    };
    let body: Vec<&str> = lines.collect();

    CANDIDATES
        .iter()
        .filter_map(|&delim| {
            let columns = field_count(header, delim);
            if columns < 2 {
                return None;
            }
            let agreeing = body.iter().filter(|l| field_count(l, delim) == columns).count();
            // header + agreeing rows, weighted by width; ties keep candidate order
            Some(((agreeing + 1) * columns, delim))
        })
        .fold(None, |best: Option<(usize, u8)>, cand| match best {
            Some(b) if b.0 >= cand.0 => Some(b),
            _ => Some(cand),
        })
        .map_or(b',', |(_, delim)| delim)
}

/// Fields in one line under `delim`, honouring quotes.
fn field_count(line: &str, delim: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |r| r.len())
}

/// Decode to UTF-8, stripping a BOM. Non-UTF-8 input is treated as
/// Windows-1252 (common for Excel-exported CSVs).
fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}
