//! Discounted cash flow engine.
//!
//! FCF_t = F0 × (1+g)^t for t = 1..n
//! TV    = FCF_n × (1+g) / (r − g)
//! DCF   = Σ FCF_t / (1+r)^t + TV / (1+r)^n

use tracing::debug;

use super::types::{DcfAssumptions, ProjectedCashFlow, ValuationResult};
use crate::data::{items, RawSnapshot};
use crate::error::{AnalyticsError, Result};

/// DCF valuation engine.
#[derive(Debug, Clone, Default)]
pub struct ValuationEngine {
    assumptions: DcfAssumptions,
}

impl ValuationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assumptions(assumptions: DcfAssumptions) -> Self {
        Self { assumptions }
    }

    pub fn assumptions(&self) -> &DcfAssumptions {
        &self.assumptions
    }

    /// Value the company from `base_fcf`, dividing by `shares` when given.
    pub fn dcf(&self, base_fcf: f64, shares: Option<f64>) -> Result<ValuationResult> {
        self.assumptions.validate()?;
        if !base_fcf.is_finite() {
            return Err(AnalyticsError::InvalidAssumption(format!(
                "base free cash flow must be finite, got {}",
                base_fcf
            )));
        }

        let r = self.assumptions.discount_rate;
        let g = self.assumptions.growth_rate;
        let n = self.assumptions.forecast_years;

        let projections: Vec<ProjectedCashFlow> = (1..=n)
            .map(|year| {
                let t = year as i32;
                let free_cash_flow = base_fcf * (1.0 + g).powi(t);
                ProjectedCashFlow {
                    year,
                    free_cash_flow,
                    present_value: free_cash_flow / (1.0 + r).powi(t),
                }
            })
            .collect();

        let last_fcf = projections
            .last()
            .map(|p| p.free_cash_flow)
            .unwrap_or(base_fcf);
        let terminal_value = last_fcf * (1.0 + g) / (r - g);
        let terminal_present_value = terminal_value / (1.0 + r).powi(n as i32);
        let intrinsic_value =
            projections.iter().map(|p| p.present_value).sum::<f64>() + terminal_present_value;

        if !intrinsic_value.is_finite() {
            return Err(AnalyticsError::InvalidAssumption(
                "valuation overflowed, horizon or inputs too large".into(),
            ));
        }

        let per_share_value = shares
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| intrinsic_value / s);

        debug!(
            base_fcf,
            discount_rate = r,
            growth_rate = g,
            years = n,
            intrinsic_value,
            "DCF computed"
        );

        Ok(ValuationResult {
            assumptions: self.assumptions,
            base_free_cash_flow: base_fcf,
            projections,
            terminal_value,
            terminal_present_value,
            intrinsic_value,
            per_share_value,
        })
    }

    /// Value the snapshot's company from its latest reported free cash flow.
    pub fn from_snapshot(&self, snapshot: &RawSnapshot) -> Result<ValuationResult> {
        let base_fcf = snapshot
            .statements
            .cash_flow
            .latest(items::FREE_CASH_FLOW)
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                AnalyticsError::MissingData(format!(
                    "'{}' for the latest period",
                    items::FREE_CASH_FLOW
                ))
            })?;

        self.dcf(base_fcf, snapshot.reference.shares_outstanding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PriceSeries, ReferenceFields, StatementSet};
    use chrono::Utc;

    #[test]
    fn test_projection_sequence() {
        let result = ValuationEngine::new().dcf(100.0, None).unwrap();
        let expected = [105.0, 110.25, 115.7625, 121.550625, 127.62815625];

        let projected = result.projected_cash_flows();
        assert_eq!(projected.len(), 5);
        for (got, want) in projected.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "{} != {}", got, want);
        }

        assert!(result.intrinsic_value.is_finite());
        assert!(result.intrinsic_value > 0.0);
        assert!(result.per_share_value.is_none());
    }

    #[test]
    fn test_total_value() {
        let result = ValuationEngine::new().dcf(100.0, Some(10.0)).unwrap();

        let pv_sum: f64 = [105.0, 110.25, 115.7625, 121.550625, 127.62815625]
            .iter()
            .enumerate()
            .map(|(i, f)| f / 1.1f64.powi(i as i32 + 1))
            .sum();
        let tv = 127.62815625 * 1.05 / 0.05;
        let expected = pv_sum + tv / 1.1f64.powi(5);

        assert!((result.terminal_value - tv).abs() < 1e-9);
        assert!((result.intrinsic_value - expected).abs() < 1e-9);
        assert!((result.per_share_value.unwrap() - expected / 10.0).abs() < 1e-9);
        assert!((result.in_billions() - expected / 1e9).abs() < 1e-18);
    }

    #[test]
    fn test_equal_rates_rejected() {
        let engine = ValuationEngine::with_assumptions(DcfAssumptions::new(0.05, 0.05, 5));
        assert!(matches!(
            engine.dcf(100.0, None),
            Err(AnalyticsError::InvalidAssumption(_))
        ));
    }

    #[test]
    fn test_other_invalid_assumptions() {
        assert!(DcfAssumptions::new(0.0, -0.02, 5).validate().is_err());
        assert!(DcfAssumptions::new(0.10, 0.05, 0).validate().is_err());
        assert!(DcfAssumptions::new(f64::NAN, 0.05, 5).validate().is_err());
        assert!(DcfAssumptions::new(0.08, 0.12, 5).validate().is_err());
        assert!(DcfAssumptions::new(0.10, 0.05, 100).validate().is_ok());
        assert!(DcfAssumptions::new(0.10, 0.05, 101).validate().is_err());
        assert!(DcfAssumptions::default().validate().is_ok());
    }

    #[test]
    fn test_oversized_horizon_rejected() {
        let engine =
            ValuationEngine::with_assumptions(DcfAssumptions::new(0.10, 0.05, u32::MAX));
        assert!(matches!(
            engine.dcf(100.0, None),
            Err(AnalyticsError::InvalidAssumption(_))
        ));
    }

    #[test]
    fn test_missing_free_cash_flow() {
        let snapshot = RawSnapshot {
            symbol: "PLTR".into(),
            prices: PriceSeries::default(),
            benchmark: None,
            statements: StatementSet::default(),
            reference: ReferenceFields::unknown(Utc::now()),
            captured_at: Utc::now(),
        };

        assert!(matches!(
            ValuationEngine::new().from_snapshot(&snapshot),
            Err(AnalyticsError::MissingData(_))
        ));
    }
}
