use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Shipping carriers with a known invoice template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Carrier {
    Dhl,
    Fedex,
    Ups,
    RoyalMail,
    Dpd,
}

impl Carrier {
    pub const ALL: [Carrier; 5] = [
        Carrier::Dhl,
        Carrier::Fedex,
        Carrier::Ups,
        Carrier::RoyalMail,
        Carrier::Dpd,
    ];

    /// Stable identifier used in storage, config keys and the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            Carrier::Dhl => "dhl",
            Carrier::Fedex => "fedex",
            Carrier::Ups => "ups",
            Carrier::RoyalMail => "royal_mail",
            Carrier::Dpd => "dpd",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Carrier::Dhl => "DHL Express",
            Carrier::Fedex => "FedEx",
            Carrier::Ups => "UPS",
            Carrier::RoyalMail => "Royal Mail",
            Carrier::Dpd => "DPD",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Carrier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect();
        match key.as_str() {
            "dhl" | "dhlexpress" => Ok(Carrier::Dhl),
            "fedex" => Ok(Carrier::Fedex),
            "ups" => Ok(Carrier::Ups),
            "royalmail" | "rm" => Ok(Carrier::RoyalMail),
            "dpd" => Ok(Carrier::Dpd),
            _ => Err(ParseEnumError {
                kind: "carrier",
                value: s.to_string(),
                expected: "dhl, fedex, ups, royal_mail, dpd",
            }),
        }
    }
}

/// Where a stored shipping cost came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostProvenance {
    /// Invoiced by the carrier. Never replaced by an estimate.
    Actual,
    /// Rate-card or label-time estimate.
    Estimated,
}

impl CostProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostProvenance::Actual => "actual",
            CostProvenance::Estimated => "estimated",
        }
    }
}

impl fmt::Display for CostProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostProvenance {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "actual" => Ok(CostProvenance::Actual),
            "estimated" | "estimate" => Ok(CostProvenance::Estimated),
            _ => Err(ParseEnumError {
                kind: "cost provenance",
                value: s.to_string(),
                expected: "actual, estimated",
            }),
        }
    }
}

/// Conflict-resolution policy applied uniformly to every record of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Only create shipments that don't exist yet.
    AddOnly,
    /// Replace any differing cost.
    OverwriteAll,
    /// Replace only when the invoice cost is higher.
    UpdateIfHigher,
    /// Replace only when the invoice cost is lower.
    UpdateIfLower,
    /// Add the invoice cost on top of the existing cost.
    AddToExisting,
}

impl UploadMode {
    pub const ALL: [UploadMode; 5] = [
        UploadMode::AddOnly,
        UploadMode::OverwriteAll,
        UploadMode::UpdateIfHigher,
        UploadMode::UpdateIfLower,
        UploadMode::AddToExisting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::AddOnly => "add_only",
            UploadMode::OverwriteAll => "overwrite_all",
            UploadMode::UpdateIfHigher => "update_if_higher",
            UploadMode::UpdateIfLower => "update_if_lower",
            UploadMode::AddToExisting => "add_to_existing",
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        UploadMode::ALL
            .into_iter()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| ParseEnumError {
                kind: "upload mode",
                value: s.to_string(),
                expected: "add_only, overwrite_all, update_if_higher, update_if_lower, add_to_existing",
            })
    }
}
