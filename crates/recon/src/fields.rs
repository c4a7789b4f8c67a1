use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a column means, independent of how the carrier labels it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
    Tracking,
    Cost,
    Date,
    Service,
    Weight,
    Currency,
    InvoiceNumber,
}

impl SemanticField {
    /// Resolution order. A column claimed by an earlier field is not reused.
    pub const ALL: [SemanticField; 7] = [
        SemanticField::Tracking,
        SemanticField::Cost,
        SemanticField::Date,
        SemanticField::Service,
        SemanticField::Weight,
        SemanticField::Currency,
        SemanticField::InvoiceNumber,
    ];

    pub const REQUIRED: [SemanticField; 2] = [SemanticField::Tracking, SemanticField::Cost];

    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticField::Tracking => "tracking",
            SemanticField::Cost => "cost",
            SemanticField::Date => "date",
            SemanticField::Service => "service",
            SemanticField::Weight => "weight",
            SemanticField::Currency => "currency",
            SemanticField::InvoiceNumber => "invoice_number",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for SemanticField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tracking" | "tracking_number" => Ok(SemanticField::Tracking),
            "cost" | "shipping_cost" => Ok(SemanticField::Cost),
            "date" | "shipping_date" => Ok(SemanticField::Date),
            "service" | "service_type" => Ok(SemanticField::Service),
            "weight" | "weight_kg" => Ok(SemanticField::Weight),
            "currency" => Ok(SemanticField::Currency),
            "invoice" | "invoice_number" => Ok(SemanticField::InvoiceNumber),
            other => Err(format!("unknown field '{other}'")),
        }
    }
}
