//! Assembles every engine's output for one snapshot.
//!
//! Engines fail independently: a section that cannot be computed carries the
//! error text and the rest of the report is still produced.

use chrono::{DateTime, Utc};
use lens_common::Config;
use serde::Serialize;
use tracing::warn;

use crate::analysis::{
    holding_return, HoldingReturn, MovingAverage, RatioEngine, RatioReport, TrendComparison,
    TrendEngine, TrendPoint,
};
use crate::data::RawSnapshot;
use crate::error::Result;
use crate::prediction::{PredictionEngine, PredictionResult};
use crate::valuation::{DcfAssumptions, ValuationEngine, ValuationResult};

/// One engine's output or the reason it is unavailable.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Section<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> Section<T> {
    fn from_result(name: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => Section::Ready(value),
            Err(e) => {
                warn!(section = name, error = %e, "Report section unavailable");
                Section::Unavailable(e.to_string())
            }
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready(value) => Some(value),
            Section::Unavailable(_) => None,
        }
    }
}

/// Everything the presentation layer shows for the instrument.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub symbol: String,
    pub captured_at: DateTime<Utc>,
    pub ratios: RatioReport,
    pub valuation: Section<ValuationResult>,
    pub short_average: Section<MovingAverage>,
    pub long_average: Section<MovingAverage>,
    pub daily_returns: Vec<TrendPoint>,
    /// Absent when no benchmark is configured
    pub comparison: Option<Section<TrendComparison>>,
    pub prediction: Section<PredictionResult>,
    /// Absent when no holding is configured
    pub holding: Option<Section<HoldingReturn>>,
}

impl AnalyticsReport {
    /// Run all engines over `snapshot` with the configured parameters.
    pub fn build(snapshot: &RawSnapshot, config: &Config) -> Self {
        let valuation = ValuationEngine::with_assumptions(DcfAssumptions::new(
            config.valuation.discount_rate,
            config.valuation.growth_rate,
            config.valuation.forecast_years,
        ));
        let trend = TrendEngine::new();
        let prediction =
            PredictionEngine::new(config.prediction.seed, config.prediction.test_fraction);

        Self {
            symbol: snapshot.symbol.clone(),
            captured_at: snapshot.captured_at,
            ratios: RatioEngine::new().from_snapshot(snapshot),
            valuation: Section::from_result("valuation", valuation.from_snapshot(snapshot)),
            short_average: Section::from_result(
                "short_average",
                trend.moving_average(&snapshot.prices, config.trend.short_window),
            ),
            long_average: Section::from_result(
                "long_average",
                trend.moving_average(&snapshot.prices, config.trend.long_window),
            ),
            daily_returns: trend.daily_returns(&snapshot.prices),
            comparison: trend
                .compare_snapshot(snapshot, config.instrument.comparison_start)
                .map(|r| Section::from_result("comparison", r)),
            prediction: Section::from_result(
                "prediction",
                prediction.fit_and_evaluate(&snapshot.prices),
            ),
            holding: config.holding.as_ref().map(|h| {
                Section::from_result(
                    "holding",
                    holding_return(&snapshot.prices, h.purchase_price, h.purchase_date),
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        items, PriceBar, PriceSeries, ReferenceFields, StatementSet, StatementTable,
    };
    use chrono::NaiveDate;
    use lens_common::config::HoldingConfig;
    use std::collections::BTreeMap;

    fn snapshot() -> RawSnapshot {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let bars: Vec<PriceBar> = (0..30)
            .map(|i| {
                let close = 10.0 + i as f64 * 0.1 + (i as f64).cos();
                PriceBar {
                    date: start + chrono::Days::new(i),
                    open: close - 0.1,
                    high: close + 0.3,
                    low: close - 0.4,
                    close,
                    volume: 5_000.0 + (i % 7) as f64 * 100.0,
                }
            })
            .collect();

        let mut cash_items = BTreeMap::new();
        cash_items.insert(items::FREE_CASH_FLOW.to_string(), vec![Some(100.0)]);
        let cash_flow = StatementTable::new(
            vec![NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()],
            cash_items,
        )
        .unwrap();

        RawSnapshot {
            symbol: "PLTR".into(),
            prices: PriceSeries::new(bars).unwrap(),
            benchmark: None,
            statements: StatementSet::new(
                StatementTable::default(),
                StatementTable::default(),
                cash_flow,
            )
            .unwrap(),
            reference: ReferenceFields::unknown(Utc::now()),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_sections_fail_independently() {
        let mut config = Config::default();
        config.trend.short_window = 5;
        config.trend.long_window = 200;
        config.holding = Some(HoldingConfig {
            purchase_price: 10.0,
            purchase_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
        });

        let report = AnalyticsReport::build(&snapshot(), &config);

        assert!(report.valuation.ready().is_some());
        assert!(report.short_average.ready().unwrap().latest().is_some());
        // Too little history for the long window, but still a series
        assert!(report.long_average.ready().unwrap().latest().is_none());
        assert!(report.comparison.is_none());
        assert!(report.prediction.ready().is_some());
        assert!(matches!(report.holding, Some(Section::Unavailable(_))));
        assert!(report.ratios.undefined_count() > 0);
    }

    #[test]
    fn test_invalid_assumptions_reported() {
        let mut config = Config::default();
        config.valuation.growth_rate = config.valuation.discount_rate;

        let report = AnalyticsReport::build(&snapshot(), &config);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["valuation"]["status"], "unavailable");
        assert!(json["valuation"]["value"]
            .as_str()
            .unwrap()
            .contains("Invalid assumption"));
        assert_eq!(json["prediction"]["status"], "ready");
    }
}
