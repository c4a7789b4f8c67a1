// Application settings
// Loaded from ~/.config/freightrecon/settings.toml

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use freightrecon_core::{Carrier, CostProvenance};
use freightrecon_io::PdfLayoutOptions;
use freightrecon_recon::{CarrierOverride, CarrierRegistry, ReconContext, ReconError, SemanticField};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("default_currency must be a 3-letter code, got '{0}'")]
    Currency(String),

    #[error("pdf.{0} must be a positive number")]
    Tolerance(&'static str),

    #[error(transparent)]
    Carrier(#[from] ReconError),
}

/// Per-carrier adjustments, keyed by carrier code in `[carriers.<code>]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CarrierSettings {
    /// Replaces the carrier's built-in provenance.
    pub provenance: Option<CostProvenance>,

    /// Carrier account tag stamped on shipments created from its invoices.
    pub account_id: Option<String>,

    /// Extra tracking-number regexes, added to the built-in ones.
    pub tracking_patterns: Vec<String>,

    /// Extra exact header names per field, e.g. `cost = ["Betrag"]`.
    pub header_synonyms: BTreeMap<SemanticField, Vec<String>>,
}

impl From<&CarrierSettings> for CarrierOverride {
    fn from(s: &CarrierSettings) -> Self {
        CarrierOverride {
            provenance: s.provenance,
            account_id: s.account_id.clone(),
            tracking_patterns: s.tracking_patterns.clone(),
            header_synonyms: s.header_synonyms.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Ledger database. `None` = platform data dir.
    pub database: Option<PathBuf>,

    /// Currency for rows with no currency column and no symbol.
    pub default_currency: String,

    pub pdf: PdfLayoutOptions,

    pub carriers: BTreeMap<Carrier, CarrierSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            default_currency: "GBP".to_string(),
            pdf: PdfLayoutOptions::default(),
            carriers: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("freightrecon")
            .join("settings.toml")
    }

    pub fn default_database_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("freightrecon")
            .join("ledger.db")
    }

    /// Load from the platform config path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ccy = self.default_currency.trim();
        if ccy.len() != 3 || !ccy.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Currency(self.default_currency.clone()));
        }
        let positive = |v: Option<f64>| v.map_or(true, |v| v.is_finite() && v > 0.0);
        if !positive(self.pdf.line_tolerance) {
            return Err(ConfigError::Tolerance("line_tolerance"));
        }
        if !positive(self.pdf.column_tolerance) {
            return Err(ConfigError::Tolerance("column_tolerance"));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(Self::default_database_path)
    }

    /// Built-in carrier templates with this file's overrides applied.
    pub fn context(&self) -> Result<ReconContext, ConfigError> {
        self.validate()?;
        let mut carriers = CarrierRegistry::builtin();
        for (carrier, overrides) in &self.carriers {
            carriers.apply_override(*carrier, &CarrierOverride::from(overrides))?;
        }
        Ok(ReconContext {
            carriers,
            default_currency: self.default_currency.trim().to_ascii_uppercase(),
            pdf: self.pdf,
        })
    }
}
