// Configuration loading

pub mod settings;

pub use settings::{CarrierSettings, ConfigError, Settings};
