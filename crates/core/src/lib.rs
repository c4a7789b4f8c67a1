//! `freightrecon-core`: shared domain types for carrier invoice reconciliation.
//!
//! Everything here is plain data: no IO, no storage, no logging.

pub mod carrier;
pub mod model;
pub mod money;
pub mod tracking;

pub use carrier::{Carrier, CostProvenance, ParseEnumError, UploadMode};
pub use model::{ExistingShipment, NewShipment, Order, ParsedInvoiceRecord};
pub use money::{format_cents, parse_amount, EQUALITY_TOLERANCE_CENTS};
pub use tracking::TrackingNumber;
