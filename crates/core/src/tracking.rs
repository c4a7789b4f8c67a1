use std::fmt;

use serde::{Deserialize, Serialize};

/// A carrier tracking number in canonical form (trimmed, upper-cased).
///
/// The only way to build one is through normalization, so every lookup and
/// comparison in the crate sees the same spelling of a given parcel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TrackingNumber(String);

impl TrackingNumber {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for TrackingNumber {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for TrackingNumber {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<TrackingNumber> for String {
    fn from(t: TrackingNumber) -> Self {
        t.0
    }
}

impl AsRef<str> for TrackingNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
