//! Carrier templates: tracking formats, header synonyms, implied provenance.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use freightrecon_core::{Carrier, CostProvenance, TrackingNumber};

use crate::error::ReconError;
use crate::fields::SemanticField;
use crate::mapper::normalize_header;

#[derive(Debug, Clone)]
pub struct CarrierTemplate {
    pub carrier: Carrier,
    pub tracking_patterns: Vec<Regex>,
    /// Carrier-specific column names, treated as exact matches by the mapper.
    pub header_synonyms: BTreeMap<SemanticField, Vec<String>>,
    /// Provenance of every cost this carrier's invoices supply.
    pub provenance: CostProvenance,
    /// Tag written on shipments this carrier's invoices create.
    pub account_id: Option<String>,
}

impl CarrierTemplate {
    pub fn builtin(carrier: Carrier) -> Self {
        let (patterns, synonyms, provenance): (Vec<&str>, Vec<(SemanticField, Vec<&str>)>, CostProvenance) = match carrier {
            Carrier::Dhl => (
                vec![r"^\d{10}$", r"^JJ?D\d{16,18}$"],
                vec![
                    (SemanticField::Tracking, vec!["AWB Number", "Waybill Number", "Shipment Number"]),
                    (SemanticField::Cost, vec!["Total Amount (excl. VAT)", "Total amount excl. VAT", "Total Charge"]),
                    (SemanticField::Date, vec!["Shipment Date"]),
                    (SemanticField::Service, vec!["Product Name", "Product"]),
                    (SemanticField::Weight, vec!["Weight (kg)", "Billed Weight"]),
                    (SemanticField::InvoiceNumber, vec!["Invoice Number"]),
                ],
                CostProvenance::Actual,
            ),
            Carrier::Fedex => (
                vec![r"^\d{12}$", r"^\d{15}$", r"^\d{20}$", r"^\d{22}$"],
                vec![
                    (SemanticField::Tracking, vec!["Express or Ground Tracking ID", "Tracking ID"]),
                    (SemanticField::Cost, vec!["Net Charge Amount", "Net Charge"]),
                    (SemanticField::Date, vec!["Shipment Date"]),
                    (SemanticField::Service, vec!["Service Type"]),
                    (SemanticField::Weight, vec!["Rated Weight Amount", "Actual Weight Amount"]),
                    (SemanticField::Currency, vec!["Currency Code"]),
                    (SemanticField::InvoiceNumber, vec!["Invoice Number"]),
                ],
                CostProvenance::Actual,
            ),
            Carrier::Ups => (
                vec![r"^1Z[0-9A-Z]{16}$", r"^T\d{10}$"],
                vec![
                    (SemanticField::Tracking, vec!["Tracking Number", "Lead Shipment Number"]),
                    (SemanticField::Cost, vec!["Net Amount", "Billed Charge"]),
                    (SemanticField::Date, vec!["Transaction Date", "Pickup Date"]),
                    (SemanticField::Service, vec!["Service Level"]),
                    (SemanticField::Weight, vec!["Billed Weight"]),
                    (SemanticField::InvoiceNumber, vec!["Invoice Number"]),
                ],
                CostProvenance::Actual,
            ),
            Carrier::RoyalMail => (
                vec![r"^[A-Z]{2}\d{9}[A-Z]{2}$"],
                vec![
                    (SemanticField::Tracking, vec!["Item ID", "Barcode", "Tracking Number"]),
                    (SemanticField::Cost, vec!["Net Value", "Price"]),
                    (SemanticField::Date, vec!["Posting Date", "Despatch Date"]),
                    (SemanticField::Service, vec!["Product Description", "Service"]),
                    (SemanticField::Weight, vec!["Weight (g)"]),
                ],
                CostProvenance::Estimated,
            ),
            Carrier::Dpd => (
                vec![r"^\d{14}$"],
                vec![
                    (SemanticField::Tracking, vec!["Parcel Number", "Consignment Number"]),
                    (SemanticField::Cost, vec!["Total Charge", "Net Amount"]),
                    (SemanticField::Date, vec!["Collection Date"]),
                    (SemanticField::Service, vec!["Service"]),
                ],
                CostProvenance::Actual,
            ),
        };

        Self {
            carrier,
            tracking_patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("builtin tracking pattern"))
                .collect(),
            header_synonyms: synonyms
                .iter()
                .map(|(f, names)| (*f, names.iter().map(|n| n.to_string()).collect()))
                .collect(),
            provenance,
            account_id: None,
        }
    }

    pub fn matches_tracking(&self, tracking: &TrackingNumber) -> bool {
        self.tracking_patterns.iter().any(|re| re.is_match(tracking.as_str()))
    }

    /// How many headers are this carrier's exact synonyms.
    pub fn header_hits(&self, headers: &[String]) -> usize {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        self.header_synonyms
            .values()
            .flatten()
            .filter(|s| normalized.contains(&normalize_header(s)))
            .count()
    }

    pub fn summary(&self) -> CarrierSummary {
        CarrierSummary {
            carrier: self.carrier,
            name: self.carrier.display_name(),
            provenance: self.provenance,
            account_id: self.account_id.clone(),
            tracking_patterns: self.tracking_patterns.iter().map(|r| r.as_str().to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CarrierSummary {
    pub carrier: Carrier,
    pub name: &'static str,
    pub provenance: CostProvenance,
    pub account_id: Option<String>,
    pub tracking_patterns: Vec<String>,
}

/// Per-carrier adjustments from configuration.
#[derive(Debug, Clone, Default)]
pub struct CarrierOverride {
    pub provenance: Option<CostProvenance>,
    pub account_id: Option<String>,
    pub tracking_patterns: Vec<String>,
    pub header_synonyms: BTreeMap<SemanticField, Vec<String>>,
}

/// Every carrier's template, indexed by [`Carrier`] discriminant.
#[derive(Debug, Clone)]
pub struct CarrierRegistry {
    templates: Vec<CarrierTemplate>,
}

impl Default for CarrierRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CarrierRegistry {
    pub fn builtin() -> Self {
        Self {
            templates: Carrier::ALL.into_iter().map(CarrierTemplate::builtin).collect(),
        }
    }

    /// Layer an override on a carrier. Patterns and synonyms are added, not replaced.
    pub fn apply_override(&mut self, carrier: Carrier, ov: &CarrierOverride) -> Result<(), ReconError> {
        let template = &mut self.templates[carrier as usize];
        if let Some(p) = ov.provenance {
            template.provenance = p;
        }
        if ov.account_id.is_some() {
            template.account_id = ov.account_id.clone();
        }
        for pattern in &ov.tracking_patterns {
            let re = Regex::new(pattern).map_err(|e| ReconError::InvalidPattern {
                carrier,
                message: e.to_string(),
            })?;
            template.tracking_patterns.push(re);
        }
        for (field, names) in &ov.header_synonyms {
            template
                .header_synonyms
                .entry(*field)
                .or_default()
                .extend(names.iter().cloned());
        }
        Ok(())
    }

    pub fn template(&self, carrier: Carrier) -> &CarrierTemplate {
        &self.templates[carrier as usize]
    }

    pub fn provenance(&self, carrier: Carrier) -> CostProvenance {
        self.template(carrier).provenance
    }

    pub fn account_id(&self, carrier: Carrier) -> Option<String> {
        self.template(carrier).account_id.clone()
    }

    pub fn templates(&self) -> impl Iterator<Item = &CarrierTemplate> {
        self.templates.iter()
    }

    /// Carriers whose tracking format accepts this number.
    pub fn carriers_for_tracking(&self, tracking: &TrackingNumber) -> Vec<Carrier> {
        self.templates
            .iter()
            .filter(|t| t.matches_tracking(tracking))
            .map(|t| t.carrier)
            .collect()
    }

    /// The carrier whose header synonyms best cover these headers, if any hit.
    pub fn detect_from_headers(&self, headers: &[String]) -> Option<Carrier> {
        let mut best: Option<(Carrier, usize)> = None;
        for t in &self.templates {
            let hits = t.header_hits(headers);
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((t.carrier, hits));
            }
        }
        best.map(|(c, _)| c)
    }
}
