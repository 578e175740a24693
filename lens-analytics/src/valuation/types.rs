//! DCF valuation types.

use lens_common::config::MAX_FORECAST_YEARS;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// Inputs of the discounted-cash-flow model. Rates are fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcfAssumptions {
    /// Discount rate r
    pub discount_rate: f64,
    /// Perpetual growth rate g, also used for the explicit forecast
    pub growth_rate: f64,
    /// Explicit forecast horizon n, in years
    pub forecast_years: u32,
}

impl Default for DcfAssumptions {
    fn default() -> Self {
        Self {
            discount_rate: 0.10,
            growth_rate: 0.05,
            forecast_years: 5,
        }
    }
}

impl DcfAssumptions {
    pub fn new(discount_rate: f64, growth_rate: f64, forecast_years: u32) -> Self {
        Self {
            discount_rate,
            growth_rate,
            forecast_years,
        }
    }

    /// Reject inputs for which the terminal value is undefined or negative.
    pub fn validate(&self) -> Result<()> {
        let r = self.discount_rate;
        let g = self.growth_rate;

        if !r.is_finite() || !g.is_finite() {
            return Err(AnalyticsError::InvalidAssumption(format!(
                "rates must be finite (r = {}, g = {})",
                r, g
            )));
        }
        if r <= 0.0 {
            return Err(AnalyticsError::InvalidAssumption(format!(
                "discount rate must be positive, got {}",
                r
            )));
        }
        if r <= g {
            return Err(AnalyticsError::InvalidAssumption(format!(
                "discount rate {} must exceed growth rate {}",
                r, g
            )));
        }
        if self.forecast_years == 0 {
            return Err(AnalyticsError::InvalidAssumption(
                "forecast horizon must be at least one year".into(),
            ));
        }
        if self.forecast_years > MAX_FORECAST_YEARS {
            return Err(AnalyticsError::InvalidAssumption(format!(
                "forecast horizon of {} years exceeds {}",
                self.forecast_years, MAX_FORECAST_YEARS
            )));
        }
        Ok(())
    }
}

/// One projected year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedCashFlow {
    pub year: u32,
    pub free_cash_flow: f64,
    pub present_value: f64,
}

/// DCF output, in the currency units of the input cash flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationResult {
    pub assumptions: DcfAssumptions,
    /// F0, the latest reported free cash flow
    pub base_free_cash_flow: f64,
    pub projections: Vec<ProjectedCashFlow>,
    pub terminal_value: f64,
    pub terminal_present_value: f64,
    /// Sum of discounted projections plus discounted terminal value
    pub intrinsic_value: f64,
    /// Intrinsic value divided by shares outstanding, when known
    pub per_share_value: Option<f64>,
}

impl ValuationResult {
    /// Intrinsic value in billions, for display.
    pub fn in_billions(&self) -> f64 {
        self.intrinsic_value / 1e9
    }

    pub fn projected_cash_flows(&self) -> Vec<f64> {
        self.projections.iter().map(|p| p.free_cash_flow).collect()
    }
}
