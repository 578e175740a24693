//! Lens Common - configuration, validation, and logging shared by the lens crates.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod validation;

pub use config::{
    Config, HoldingConfig, InstrumentConfig, ObservabilityConfig, PredictionConfig,
    RefreshConfig, TrendConfig, ValuationConfig,
};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::logging::{init_from_config, init_logging};
    pub use crate::validation::{Validate, ValidationError};
}
