//! Upload history: one row per committed file.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freightrecon_core::{Carrier, UploadMode};

use crate::error::ReconError;

/// What committing one record actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Added,
    Skipped,
    Blocked,
    Errored,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Added => "added",
            Outcome::Skipped => "skipped",
            Outcome::Blocked => "blocked",
            Outcome::Errored => "errored",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounts {
    pub created: usize,
    pub updated: usize,
    pub added: usize,
    pub skipped: usize,
    pub blocked: usize,
    pub errored: usize,
}

impl UploadCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Added => self.added += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Blocked => self.blocked += 1,
            Outcome::Errored => self.errored += 1,
        }
    }

    pub fn sum(&self) -> usize {
        self.created + self.updated + self.added + self.skipped + self.blocked + self.errored
    }
}

impl FromIterator<Outcome> for UploadCounts {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        let mut counts = Self::default();
        for o in iter {
            counts.record(o);
        }
        counts
    }
}

/// A history row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewUploadHistory {
    pub carrier: Carrier,
    pub mode: UploadMode,
    pub file_name: Option<String>,
    pub digest: String,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub counts: UploadCounts,
    pub total: usize,
}

impl NewUploadHistory {
    /// Fails when the outcome counts don't add up to `total`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        carrier: Carrier,
        mode: UploadMode,
        file_name: Option<String>,
        digest: String,
        uploaded_by: Option<String>,
        uploaded_at: DateTime<Utc>,
        counts: UploadCounts,
        total: usize,
    ) -> Result<Self, ReconError> {
        if counts.sum() != total {
            return Err(ReconError::InconsistentCounts { counted: counts.sum(), total });
        }
        Ok(Self {
            carrier,
            mode,
            file_name,
            digest,
            uploaded_by,
            uploaded_at,
            counts,
            total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadHistory {
    pub id: i64,
    pub carrier: Carrier,
    pub mode: UploadMode,
    pub file_name: Option<String>,
    pub digest: String,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: UploadCounts,
    pub total: usize,
}

impl UploadHistory {
    pub fn from_new(id: i64, new: &NewUploadHistory) -> Self {
        Self {
            id,
            carrier: new.carrier,
            mode: new.mode,
            file_name: new.file_name.clone(),
            digest: new.digest.clone(),
            uploaded_by: new.uploaded_by.clone(),
            uploaded_at: new.uploaded_at,
            counts: new.counts,
            total: new.total,
        }
    }
}
