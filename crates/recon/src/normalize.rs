//! Raw rows → typed invoice records.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use freightrecon_core::{parse_amount, ParsedInvoiceRecord, TrackingNumber};
use freightrecon_io::RawTable;

use crate::carriers::{CarrierRegistry, CarrierTemplate};
use crate::error::ReconError;
use crate::fields::SemanticField;
use crate::mapper::{normalize_header, ColumnMapping};

/// A parsed record plus the row it came from, kept verbatim for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    #[serde(flatten)]
    pub record: ParsedInvoiceRecord,
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub missing_tracking: usize,
    pub missing_cost: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.missing_tracking + self.missing_cost
    }

    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.missing_tracking > 0 {
            out.push(format!("{} rows skipped: missing tracking number", self.missing_tracking));
        }
        if self.missing_cost > 0 {
            out.push(format!("{} rows skipped: missing or zero cost", self.missing_cost));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Normalized {
    pub lines: Vec<InvoiceLine>,
    pub drops: DropCounts,
    pub warnings: Vec<String>,
}

/// Apply a complete mapping to every row.
pub fn normalize(
    table: &RawTable,
    mapping: &ColumnMapping,
    template: &CarrierTemplate,
    registry: &CarrierRegistry,
    default_currency: &str,
) -> Result<Normalized, ReconError> {
    let missing = mapping.missing_required();
    let (Some(tracking_col), Some(cost_col)) = (
        mapping.column(SemanticField::Tracking),
        mapping.column(SemanticField::Cost),
    ) else {
        return Err(ReconError::MappingIncomplete(missing));
    };

    let date_col = mapping.column(SemanticField::Date);
    let service_col = mapping.column(SemanticField::Service);
    let weight_col = mapping.column(SemanticField::Weight);
    let currency_col = mapping.column(SemanticField::Currency);
    let invoice_col = mapping.column(SemanticField::InvoiceNumber);
    let weight_in_grams = weight_col
        .and_then(|c| table.headers.get(c))
        .is_some_and(|h| header_says_grams(h));

    let mut out = Normalized::default();
    let mut unrecognised: Vec<TrackingNumber> = Vec::new();

    for row in &table.rows {
        let tracking = TrackingNumber::new(row.get(tracking_col));
        if tracking.is_empty() {
            out.drops.missing_tracking += 1;
            continue;
        }

        let cost_cell = row.get(cost_col);
        let cost = parse_amount(cost_cell).unwrap_or(0);
        if cost <= 0 {
            out.drops.missing_cost += 1;
            continue;
        }

        if !template.matches_tracking(&tracking) {
            unrecognised.push(tracking.clone());
        }

        let currency = currency_col
            .map(|c| row.get(c).trim().to_uppercase())
            .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
            .or_else(|| currency_from_symbol(cost_cell))
            .unwrap_or_else(|| default_currency.to_uppercase());

        let record = ParsedInvoiceRecord {
            tracking_number: tracking,
            shipping_cost_cents: cost,
            currency,
            service_type: service_col.and_then(|c| non_empty(row.get(c))),
            weight_kg: weight_col.and_then(|c| parse_weight_kg(row.get(c), weight_in_grams)),
            shipping_date: date_col.and_then(|c| parse_date(row.get(c))),
            invoice_number: invoice_col.and_then(|c| non_empty(row.get(c))),
            source_row: row.line,
        };
        out.lines.push(InvoiceLine {
            record,
            raw: row.to_record(&table.headers),
        });
    }

    out.warnings.extend(out.drops.messages());
    if !unrecognised.is_empty() {
        out.warnings.push(tracking_warning(template, registry, &unrecognised));
    }
    if out.drops.total() > 0 {
        log::info!(
            "normalize: kept {}, dropped {} (no tracking {}, no cost {})",
            out.lines.len(),
            out.drops.total(),
            out.drops.missing_tracking,
            out.drops.missing_cost
        );
    }
    Ok(out)
}

fn tracking_warning(template: &CarrierTemplate, registry: &CarrierRegistry, unrecognised: &[TrackingNumber]) -> String {
    let mut msg = format!(
        "{} tracking number(s) do not match the {} format",
        unrecognised.len(),
        template.carrier.display_name()
    );
    // Suggest a carrier only when every unrecognised number agrees on it
    let mut candidates = registry.carriers_for_tracking(&unrecognised[0]);
    for t in &unrecognised[1..] {
        let fits = registry.carriers_for_tracking(t);
        candidates.retain(|c| fits.contains(c));
    }
    if let [suggested] = candidates.as_slice() {
        msg.push_str(&format!("; they look like {}", suggested.display_name()));
    }
    msg
}

fn non_empty(cell: &str) -> Option<String> {
    let t = cell.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn currency_from_symbol(cell: &str) -> Option<String> {
    let upper = cell.to_uppercase();
    for code in ["GBP", "USD", "EUR"] {
        if upper.contains(code) {
            return Some(code.to_string());
        }
    }
    if cell.contains('£') {
        Some("GBP".into())
    } else if cell.contains('€') {
        Some("EUR".into())
    } else if cell.contains('$') {
        Some("USD".into())
    } else {
        None
    }
}

fn header_says_grams(header: &str) -> bool {
    let h = normalize_header(header);
    h.contains("(g)")
        || h.contains("gram")
        || h.contains("[g]")
        || h.ends_with(" g")
        || h.contains(" in g")
}

/// Weight in kilograms. A unit suffix on the cell wins over the header.
pub fn parse_weight_kg(cell: &str, header_in_grams: bool) -> Option<f64> {
    let lower = cell.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let number: String = lower
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect::<String>()
        .replace(',', ".");
    let value: f64 = number.parse().ok()?;

    let unit = lower.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ',' || c.is_whitespace());
    let kg = match unit {
        "kg" | "kgs" => value,
        "g" | "gr" | "grams" => value / 1000.0,
        "lb" | "lbs" => value * 0.453_592_37,
        "" if header_in_grams => value / 1000.0,
        "" => value,
        _ => return None,
    };
    Some(kg)
}

/// ISO 8601 date or date-time, `DD/MM/YYYY`, `DD-MM-YYYY` or `DD.MM.YYYY`.
/// Anything else is an unknown date.
pub fn parse_date(cell: &str) -> Option<NaiveDate> {
    let s = cell.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Some(prefix) = s.get(..10) {
        let rest = &s[10..];
        if (rest.starts_with('T') || rest.starts_with(' ')) && prefix.as_bytes()[4] == b'-' {
            if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Some(d);
            }
        }
    }
    for fmt in ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}
