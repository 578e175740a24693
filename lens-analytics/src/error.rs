//! Error type shared by the analytics engines, the store and the refresh daemon.

use thiserror::Error;

use crate::data::ProviderError;

/// Errors surfaced by the analytics pipeline.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A required line item or series is absent.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// DCF inputs are ill-posed (r <= g, r <= 0, zero horizon, non-finite).
    #[error("Invalid assumption: {0}")]
    InvalidAssumption(String),

    /// The market-data source failed.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(#[from] ProviderError),

    /// Too few observations to split or evaluate.
    #[error("Insufficient data: {rows} usable rows, at least {required} required")]
    InsufficientData { rows: usize, required: usize },

    /// A table could not be written or read back.
    #[error("Persistence failed for '{key}': {reason}")]
    Persistence { key: String, reason: String },

    /// Ordering or alignment contract violated while building domain values.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The regression solver rejected the training rows.
    #[error("Model fit failed: {0}")]
    ModelFit(String),

    /// Bad engine parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AnalyticsError {
    pub(crate) fn persistence(key: &str, reason: impl ToString) -> Self {
        Self::Persistence {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
