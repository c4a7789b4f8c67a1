// Excel (.xlsx / .xls) invoice import via calamine

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate};

use crate::error::FormatError;
use crate::table::RawTable;

/// Read the first worksheet. Row 1 is the header; fully blank rows are skipped.
pub fn read(bytes: &[u8]) -> Result<RawTable, FormatError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| FormatError::Spreadsheet(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.is_empty() {
        return Err(FormatError::NoSheets);
    }
    if sheet_names.len() > 1 {
        log::info!(
            "spreadsheet: {} sheets, reading only '{}'",
            sheet_names.len(),
            sheet_names[0]
        );
    }

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(FormatError::NoSheets)?
        .map_err(|e| FormatError::Spreadsheet(e.to_string()))?;

    // Ranges start at the first used cell, not necessarily A1
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let mut rows = range.rows().enumerate();

    let headers: Vec<String> = loop {
        match rows.next() {
            Some((_, cells)) => {
                let rendered: Vec<String> = cells.iter().map(|c| render(c).0).collect();
                if rendered.iter().any(|c| !c.is_empty()) {
                    break rendered;
                }
            }
            None => return Err(FormatError::MissingHeader),
        }
    };

    let mut table = RawTable::new(headers);
    let mut error_cells = 0usize;

    for (idx, cells) in rows {
        let mut rendered = Vec::with_capacity(cells.len());
        for cell in cells {
            let (text, is_error) = render(cell);
            if is_error {
                error_cells += 1;
            }
            rendered.push(text);
        }
        if rendered.iter().all(|c| c.is_empty()) {
            continue;
        }
        table.push_padded(first_row + idx + 1, rendered);
    }

    if error_cells > 0 {
        table
            .warnings
            .push(format!("{error_cells} cell(s) contained spreadsheet errors and were read as empty"));
    }

    Ok(table)
}

/// Render a cell as text. The flag is set for error cells.
fn render(cell: &Data) -> (String, bool) {
    let text = match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(n) => {
            // Format nicely: integers without decimals (keeps numeric tracking numbers intact)
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => format!("{}", n),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(_) => return (String::new(), true),
        Data::DateTime(dt) => {
            if dt.is_datetime() {
                excel_serial_to_iso(dt.as_f64()).unwrap_or_else(|| format!("{}", dt.as_f64()))
            } else {
                format!("{}", dt.as_f64())
            }
        }
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    };
    (text, false)
}

/// Convert an Excel 1900-system serial to `YYYY-MM-DD` (or full ISO
/// date-time when a time of day is present).
fn excel_serial_to_iso(serial: f64) -> Option<String> {
    // 1899-12-30 absorbs Excel's phantom 1900-02-29
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = serial.trunc() as i64;
    let date = base.checked_add_signed(Duration::days(days))?;
    let secs = ((serial.fract()) * 86_400.0).round() as i64;
    if secs == 0 {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let dt = date.and_hms_opt(0, 0, 0)? + Duration::seconds(secs);
    Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}
