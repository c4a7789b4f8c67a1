//! Heuristic column mapping.
//!
//! Each semantic field has a short list of exact names, an ordered keyword
//! list and an exclusion list. A header matching a keyword as a substring
//! scores `keyword_len / header_len + 0.5 * (n - rank) / n`; an exact name
//! scores [`EXACT_SCORE`], above anything a substring can reach. Fields are
//! resolved in [`SemanticField::ALL`] order and each column is claimed once.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ReconError;
use crate::fields::SemanticField;

pub const EXACT_SCORE: f64 = 2.0;
const PRIORITY_WEIGHT: f64 = 0.5;

// ---------------------------------------------------------------------------
// Dictionaries
// ---------------------------------------------------------------------------

struct FieldRule {
    field: SemanticField,
    exact: &'static [&'static str],
    keywords: &'static [&'static str],
    exclusions: &'static [&'static str],
}

/// Sub-charges that must never be mistaken for the invoice total.
const COST_EXCLUSIONS: &[&str] = &[
    "duty", "duties", "surcharge", "fuel", "insurance", "discount", "tax", "vat", "gst", "xc1", "xc2",
    "xc3", "xc4", "xc5", "xc6", "xc7", "xc8", "xc9", "extra charge", "remote area", "oversize",
    "currency", "weight", "date", "number", "count",
];

/// Exclusions that name a tax rather than a charge.
const TAX_WORDS: &[&str] = &["tax", "vat", "gst"];

/// A header stating its amount is net of tax is a total, not a tax line.
const NET_OF_TAX: &[&str] = &[
    "excl", "excluding", "exclusive of", "ex tax", "ex vat", "ex. vat", "net of", "before tax", "pre-tax",
    "pre tax", "without tax", "without vat",
];

const RULES: &[FieldRule] = &[
    FieldRule {
        field: SemanticField::Tracking,
        exact: &[
            "tracking number", "tracking no", "tracking no.", "tracking", "tracking id", "awb",
            "awb number", "awb no", "waybill", "waybill number", "air waybill", "consignment number",
            "parcel number", "shipment number",
        ],
        keywords: &["tracking", "awb", "waybill", "airbill", "consignment", "parcel", "barcode", "shipment"],
        exclusions: &["date", "weight", "charge", "amount", "cost", "count", "service", "type", "status"],
    },
    FieldRule {
        field: SemanticField::Cost,
        exact: &[
            "total", "total amount", "total charge", "total charges", "net charge", "net amount",
            "shipping cost", "amount", "total amount excluding tax", "total amount excl. tax",
            "total amount excl tax", "total amount (excl. tax)", "total excluding tax", "total excl. tax",
            "total amount excluding vat", "total amount excl. vat", "total amount (excl. vat)",
            "total excl. vat", "net amount excluding vat", "amount excluding tax",
        ],
        keywords: &["total", "net", "amount", "charge", "cost", "price", "value"],
        exclusions: COST_EXCLUSIONS,
    },
    FieldRule {
        field: SemanticField::Date,
        exact: &["ship date", "shipment date", "shipping date", "date"],
        keywords: &["ship date", "shipment date", "shipping date", "collection date", "pickup date", "posting date", "date"],
        exclusions: &["due", "invoice"],
    },
    FieldRule {
        field: SemanticField::Service,
        exact: &["service", "service type", "product", "product name"],
        keywords: &["service", "product", "method", "level", "class"],
        exclusions: &["charge", "amount", "cost", "date", "fee"],
    },
    FieldRule {
        field: SemanticField::Weight,
        exact: &["weight", "weight (kg)", "billed weight", "chargeable weight"],
        keywords: &["billed weight", "chargeable weight", "weight", "kg", "wt"],
        exclusions: &["charge", "amount", "cost", "unit"],
    },
    FieldRule {
        field: SemanticField::Currency,
        exact: &["currency", "currency code", "ccy"],
        keywords: &["currency", "ccy", "curr"],
        exclusions: &["rate", "conversion"],
    },
    FieldRule {
        field: SemanticField::InvoiceNumber,
        exact: &["invoice number", "invoice no", "invoice no.", "invoice"],
        keywords: &["invoice number", "invoice no", "invoice ref", "invoice id", "invoice"],
        exclusions: &["date", "amount", "total", "type", "line"],
    },
];

fn rule(field: SemanticField) -> &'static FieldRule {
    // RULES covers every SemanticField
    RULES.iter().find(|r| r.field == field).unwrap_or(&RULES[0])
}

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_header(h: &str) -> String {
    h.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Exact,
    Keyword,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMatch {
    pub column: usize,
    pub header: String,
    pub score: f64,
    pub source: MatchSource,
}

/// Field → column. May be partial; see [`ColumnMapping::missing_required`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMapping {
    pub fields: BTreeMap<SemanticField, FieldMatch>,
}

impl ColumnMapping {
    pub fn column(&self, field: SemanticField) -> Option<usize> {
        self.fields.get(&field).map(|m| m.column)
    }

    pub fn get(&self, field: SemanticField) -> Option<&FieldMatch> {
        self.fields.get(&field)
    }

    pub fn missing_required(&self) -> Vec<SemanticField> {
        SemanticField::REQUIRED
            .into_iter()
            .filter(|f| !self.fields.contains_key(f))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    fn claims(&self, column: usize) -> bool {
        self.fields.values().any(|m| m.column == column)
    }
}

/// A user-supplied column for a field: by header text or 0-based index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualColumn {
    Index(usize),
    Header(String),
}

/// Manual overrides, applied before automatic mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualMapping {
    pub assignments: BTreeMap<SemanticField, ManualColumn>,
}

impl ManualMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Parse `FIELD=COLUMN` pairs, e.g. `cost=Net Charge` or `tracking=#0`.
    /// `#N` selects a column by index.
    pub fn parse<S: AsRef<str>>(pairs: &[S]) -> Result<Self, ReconError> {
        let mut mapping = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (field, column) = pair
                .split_once('=')
                .ok_or_else(|| ReconError::InvalidManualMapping(pair.to_string()))?;
            let field = SemanticField::from_str(field)
                .map_err(|_| ReconError::InvalidManualMapping(pair.to_string()))?;
            let column = column.trim();
            if column.is_empty() {
                return Err(ReconError::InvalidManualMapping(pair.to_string()));
            }
            let column = match column.strip_prefix('#').map(str::parse::<usize>) {
                Some(Ok(idx)) => ManualColumn::Index(idx),
                _ => ManualColumn::Header(column.to_string()),
            };
            mapping.assignments.insert(field, column);
        }
        Ok(mapping)
    }
}

/// Map headers to semantic fields.
///
/// `extra_exact` adds carrier-specific exact names. Never fails for missing
/// fields; only an unresolvable manual assignment is an error.
pub fn map_columns(
    headers: &[String],
    extra_exact: &BTreeMap<SemanticField, Vec<String>>,
    manual: &ManualMapping,
) -> Result<ColumnMapping, ReconError> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut mapping = ColumnMapping::default();

    for (&field, column) in &manual.assignments {
        let idx = match column {
            ManualColumn::Index(i) if *i < headers.len() => *i,
            ManualColumn::Index(i) => {
                return Err(ReconError::UnknownColumn { field, column: format!("#{i}") });
            }
            ManualColumn::Header(name) => {
                let wanted = normalize_header(name);
                normalized
                    .iter()
                    .position(|h| *h == wanted)
                    .ok_or_else(|| ReconError::UnknownColumn { field, column: name.clone() })?
            }
        };
        mapping.fields.insert(
            field,
            FieldMatch {
                column: idx,
                header: headers[idx].clone(),
                score: EXACT_SCORE,
                source: MatchSource::Manual,
            },
        );
    }

    for field in SemanticField::ALL {
        if mapping.fields.contains_key(&field) {
            continue;
        }
        let extra: Vec<String> = extra_exact
            .get(&field)
            .map(|names| names.iter().map(|n| normalize_header(n)).collect())
            .unwrap_or_default();

        let mut best: Option<FieldMatch> = None;
        for (idx, header) in normalized.iter().enumerate() {
            if header.is_empty() || mapping.claims(idx) {
                continue;
            }
            if let Some((score, source)) = score_header(field, header, &extra) {
                // strict > keeps the first-found column on ties
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(FieldMatch {
                        column: idx,
                        header: headers[idx].clone(),
                        score,
                        source,
                    });
                }
            }
        }
        if let Some(m) = best {
            log::debug!("mapped {field} -> '{}' ({:?}, {:.3})", m.header, m.source, m.score);
            mapping.fields.insert(field, m);
        }
    }

    Ok(mapping)
}

/// Score one normalized header for a field, or `None` if it can't match.
fn score_header(field: SemanticField, header: &str, extra_exact: &[String]) -> Option<(f64, MatchSource)> {
    let rule = rule(field);

    if extra_exact.iter().any(|e| e == header) || rule.exact.contains(&header) {
        return Some((EXACT_SCORE, MatchSource::Exact));
    }
    if is_excluded(rule, header) {
        return None;
    }

    let n = rule.keywords.len() as f64;
    rule.keywords
        .iter()
        .enumerate()
        .filter(|(_, kw)| header.contains(*kw))
        .map(|(rank, kw)| {
            let ratio = kw.len() as f64 / header.len() as f64;
            let bonus = PRIORITY_WEIGHT * (n - rank as f64) / n;
            ratio + bonus
        })
        .max_by(|a, b| a.total_cmp(b))
        .map(|s| (s, MatchSource::Keyword))
}

fn is_excluded(rule: &FieldRule, header: &str) -> bool {
    let net_of_tax = NET_OF_TAX.iter().any(|m| header.contains(m));
    rule.exclusions
        .iter()
        .any(|ex| header.contains(ex) && !(net_of_tax && TAX_WORDS.contains(ex)))
}
