//! Configuration validation.
//!
//! Every section is checked independently and the errors are collected,
//! so a single run reports every bad field at once.

use thiserror::Error;

use crate::config::{
    Config, HoldingConfig, InstrumentConfig, ObservabilityConfig, PredictionConfig,
    RefreshConfig, TrendConfig, ValuationConfig, MAX_FORECAST_YEARS,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn collapse(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut sections: Vec<&dyn Validate> = vec![
            &self.instrument,
            &self.valuation,
            &self.trend,
            &self.prediction,
            &self.refresh,
            &self.observability,
        ];
        if let Some(holding) = &self.holding {
            sections.push(holding);
        }

        let errors = sections
            .into_iter()
            .filter_map(|section| section.validate().err())
            .collect();

        collapse(errors)
    }

    /// Load configuration with env overrides and validate it.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
        Ok(config)
    }
}

impl Validate for InstrumentConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "instrument.symbol".into(),
            });
        }
        if self.benchmark_symbol.as_deref() == Some(self.symbol.as_str()) {
            return Err(ValidationError::Conflict {
                reason: "instrument.benchmark_symbol must differ from instrument.symbol".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ValuationConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !self.discount_rate.is_finite() || self.discount_rate <= 0.0 {
            errors.push(invalid(
                "valuation.discount_rate",
                format!("must be a positive rate, got {}", self.discount_rate),
            ));
        }
        if !self.growth_rate.is_finite() {
            errors.push(invalid("valuation.growth_rate", "must be finite"));
        } else if self.growth_rate >= self.discount_rate {
            errors.push(invalid(
                "valuation.growth_rate",
                format!(
                    "must be below discount_rate ({} >= {})",
                    self.growth_rate, self.discount_rate
                ),
            ));
        }
        if self.forecast_years == 0 || self.forecast_years > MAX_FORECAST_YEARS {
            errors.push(invalid(
                "valuation.forecast_years",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_FORECAST_YEARS, self.forecast_years
                ),
            ));
        }

        collapse(errors)
    }
}

impl Validate for TrendConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.short_window == 0 {
            errors.push(invalid("trend.short_window", "must be at least 1"));
        }
        if self.long_window == 0 {
            errors.push(invalid("trend.long_window", "must be at least 1"));
        }
        collapse(errors)
    }
}

impl Validate for PredictionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(invalid(
                "prediction.test_fraction",
                format!("must be in (0, 1), got {}", self.test_fraction),
            ));
        }
        Ok(())
    }
}

impl Validate for RefreshConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if let Err(e) = self.hour_minute() {
            errors.push(invalid("refresh.time", e.to_string()));
        }
        if self.poll_interval_secs == 0 {
            errors.push(invalid("refresh.poll_interval_secs", "must be at least 1"));
        }
        collapse(errors)
    }
}

impl Validate for HoldingConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !self.purchase_price.is_finite() || self.purchase_price <= 0.0 {
            return Err(invalid(
                "holding.purchase_price",
                format!("must be positive, got {}", self.purchase_price),
            ));
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.log_level, valid_levels
                ),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_format",
                format!(
                    "Invalid log format '{}'. Must be one of: {:?}",
                    self.log_format, valid_formats
                ),
            ));
        }

        Ok(())
    }
}
