//! Market data provider abstraction.
//!
//! The refresh daemon only talks to the source through `MarketDataProvider`,
//! so tests substitute in-memory providers and the HTTP adapter stays swappable.

use async_trait::async_trait;
use std::fmt;

use super::{PriceSeries, ReferenceFields, StatementSet, StatementTable};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Data not available for the requested symbol
    DataNotAvailable(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
    /// Internal provider error (unexpected payload, contract violation)
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Provider Trait
// ============================================================================

/// Source of raw market data for one instrument at a time.
///
/// Implementations must report failures as `ProviderError`, never as an
/// empty or zero-filled value.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logging (e.g., "yahoo")
    fn name(&self) -> &'static str;

    /// Full daily price history, oldest first.
    async fn price_history(&self, symbol: &str) -> Result<PriceSeries, ProviderError>;

    /// Annual income statement, most recent period first.
    async fn income_statement(&self, symbol: &str) -> Result<StatementTable, ProviderError>;

    /// Annual balance sheet, most recent period first.
    async fn balance_sheet(&self, symbol: &str) -> Result<StatementTable, ProviderError>;

    /// Annual cash flow statement, most recent period first.
    async fn cash_flow(&self, symbol: &str) -> Result<StatementTable, ProviderError>;

    /// Market capitalisation and shares outstanding as of now.
    async fn reference_fields(&self, symbol: &str) -> Result<ReferenceFields, ProviderError>;

    /// All three statements, checked for a shared latest period.
    ///
    /// Default implementation calls the per-statement accessors.
    async fn statements(&self, symbol: &str) -> Result<StatementSet, ProviderError> {
        let income = self.income_statement(symbol).await?;
        let balance_sheet = self.balance_sheet(symbol).await?;
        let cash_flow = self.cash_flow(symbol).await?;
        StatementSet::new(income, balance_sheet, cash_flow)
            .map_err(|e| ProviderError::Internal(e.to_string()))
    }
}
