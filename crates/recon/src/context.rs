use freightrecon_io::PdfLayoutOptions;

use crate::carriers::CarrierRegistry;

/// Everything a run needs besides the store, passed explicitly.
#[derive(Debug, Clone)]
pub struct ReconContext {
    pub carriers: CarrierRegistry,
    /// Used when a row has no currency column and no currency symbol.
    pub default_currency: String,
    pub pdf: PdfLayoutOptions,
}

impl Default for ReconContext {
    fn default() -> Self {
        Self {
            carriers: CarrierRegistry::builtin(),
            default_currency: "GBP".to_string(),
            pdf: PdfLayoutOptions::default(),
        }
    }
}
