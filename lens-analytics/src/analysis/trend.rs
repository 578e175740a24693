//! Price trend analytics: moving averages, daily returns, and a
//! benchmark-normalised comparison.

use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::HashMap;

use crate::data::{PriceSeries, RawSnapshot};
use crate::error::{AnalyticsError, Result};

/// One dated point of a derived series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Trailing moving average over one window.
#[derive(Debug, Clone, Serialize)]
pub struct MovingAverage {
    pub window: usize,
    pub points: Vec<TrendPoint>,
}

impl MovingAverage {
    /// Most recent defined value.
    pub fn latest(&self) -> Option<f64> {
        self.points.iter().rev().find_map(|p| p.value)
    }
}

/// Own and benchmark closes rebased to 1.0 on the first common date.
#[derive(Debug, Clone, Serialize)]
pub struct TrendComparison {
    pub start: NaiveDate,
    pub dates: Vec<NaiveDate>,
    pub own: Vec<f64>,
    pub benchmark: Vec<f64>,
}

impl TrendComparison {
    /// Final normalised value of own minus that of the benchmark.
    pub fn relative_performance(&self) -> Option<f64> {
        Some(self.own.last()? - self.benchmark.last()?)
    }
}

/// Moving averages, returns and benchmark comparison.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrendEngine;

impl TrendEngine {
    pub fn new() -> Self {
        Self
    }

    /// MA_k(t): mean close over the `window` sessions ending at t.
    ///
    /// The first `window - 1` points are `None`.
    pub fn moving_average(&self, series: &PriceSeries, window: usize) -> Result<MovingAverage> {
        if window == 0 {
            return Err(AnalyticsError::InvalidInput(
                "moving average window must be at least 1".into(),
            ));
        }

        let bars = series.bars();
        let points = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let value = (i + 1 >= window)
                    .then(|| bars[i + 1 - window..=i].iter().map(|b| b.close).mean())
                    .filter(|v| v.is_finite());
                TrendPoint {
                    date: bar.date,
                    value,
                }
            })
            .collect();

        Ok(MovingAverage { window, points })
    }

    /// Close-to-close fractional change. The first session has no return.
    pub fn daily_returns(&self, series: &PriceSeries) -> Vec<TrendPoint> {
        let bars = series.bars();
        bars.iter()
            .enumerate()
            .map(|(i, bar)| {
                let value = i
                    .checked_sub(1)
                    .map(|prev| (bar.close - bars[prev].close) / bars[prev].close)
                    .filter(|r| r.is_finite());
                TrendPoint {
                    date: bar.date,
                    value,
                }
            })
            .collect()
    }

    /// Inner-join both series on dates on or after `start`, then rebase
    /// each to its close on the first common date.
    pub fn compare(
        &self,
        own: &PriceSeries,
        benchmark: &PriceSeries,
        start: NaiveDate,
    ) -> Result<TrendComparison> {
        let bench_by_date: HashMap<NaiveDate, f64> = benchmark
            .since(start)
            .iter()
            .map(|b| (b.date, b.close))
            .collect();

        let joined: Vec<(NaiveDate, f64, f64)> = own
            .since(start)
            .iter()
            .filter_map(|b| bench_by_date.get(&b.date).map(|&bc| (b.date, b.close, bc)))
            .collect();

        let &(first_date, own_base, bench_base) = joined.first().ok_or_else(|| {
            AnalyticsError::MissingData(format!("no common trading dates on or after {}", start))
        })?;

        if !(own_base > 0.0 && bench_base > 0.0) {
            return Err(AnalyticsError::InvalidInput(format!(
                "non-positive base close on {} (own {}, benchmark {})",
                first_date, own_base, bench_base
            )));
        }

        Ok(TrendComparison {
            start: first_date,
            dates: joined.iter().map(|(d, _, _)| *d).collect(),
            own: joined.iter().map(|(_, o, _)| o / own_base).collect(),
            benchmark: joined.iter().map(|(_, _, b)| b / bench_base).collect(),
        })
    }

    /// Benchmark comparison for a snapshot, `None` if it has no benchmark.
    pub fn compare_snapshot(
        &self,
        snapshot: &RawSnapshot,
        start: NaiveDate,
    ) -> Option<Result<TrendComparison>> {
        snapshot
            .benchmark
            .as_ref()
            .map(|benchmark| self.compare(&snapshot.prices, benchmark, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;

    fn series(start: NaiveDate, closes: &[f64]) -> PriceSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: start + chrono::Days::new(i as u64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 100.0,
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 9, d).unwrap()
    }

    #[test]
    fn test_moving_average_window() {
        let s = series(day(1), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let ma = TrendEngine::new().moving_average(&s, 3).unwrap();

        let values: Vec<Option<f64>> = ma.points.iter().map(|p| p.value).collect();
        assert_eq!(values[0], None);
        assert_eq!(values[1], None);
        assert!((values[2].unwrap() - 2.0).abs() < 1e-12);
        assert!((values[3].unwrap() - 3.0).abs() < 1e-12);
        assert!((values[4].unwrap() - 4.0).abs() < 1e-12);
        assert!((ma.latest().unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_moving_average_short_history_and_zero_window() {
        let s = series(day(1), &[1.0, 2.0]);
        let engine = TrendEngine::new();

        let ma = engine.moving_average(&s, 50).unwrap();
        assert!(ma.points.iter().all(|p| p.value.is_none()));
        assert!(ma.latest().is_none());

        assert!(matches!(
            engine.moving_average(&s, 0),
            Err(AnalyticsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_moving_average_recovers_after_gap() {
        let s = series(day(1), &[1.0, f64::NAN, 3.0, 4.0, 5.0]);
        let ma = TrendEngine::new().moving_average(&s, 2).unwrap();
        let values: Vec<Option<f64>> = ma.points.iter().map(|p| p.value).collect();

        assert_eq!(values[1], None);
        assert_eq!(values[2], None);
        assert!((values[3].unwrap() - 3.5).abs() < 1e-12);
        assert!((values[4].unwrap() - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_daily_returns() {
        let s = series(day(1), &[10.0, 11.0, 9.9]);
        let returns = TrendEngine::new().daily_returns(&s);

        assert_eq!(returns[0].value, None);
        assert!((returns[1].value.unwrap() - 0.1).abs() < 1e-12);
        assert!((returns[2].value.unwrap() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_compare_normalises_to_one_at_start() {
        // Own starts trading a day before the benchmark window opens
        let own = series(day(28), &[7.0, 9.5, 9.2, 10.0, 11.0]);
        let bench = series(day(30), &[3363.0, 3380.8, 3348.4]);

        let cmp = TrendEngine::new().compare(&own, &bench, day(29)).unwrap();

        assert_eq!(cmp.start, day(30));
        assert_eq!(cmp.dates.len(), 3);
        assert_eq!(cmp.own[0], 1.0);
        assert_eq!(cmp.benchmark[0], 1.0);
        assert!((cmp.own[1] - 10.0 / 9.2).abs() < 1e-12);
        assert!((cmp.benchmark[2] - 3348.4 / 3363.0).abs() < 1e-12);
        assert!(cmp.relative_performance().is_some());
    }

    #[test]
    fn test_compare_without_common_dates() {
        let own = series(day(1), &[1.0, 2.0]);
        let bench = series(day(10), &[1.0, 2.0]);

        assert!(matches!(
            TrendEngine::new().compare(&own, &bench, day(1)),
            Err(AnalyticsError::MissingData(_))
        ));
    }

    #[test]
    fn test_compare_rejects_non_positive_base() {
        let own = series(day(1), &[0.0, 2.0]);
        let bench = series(day(1), &[1.0, 2.0]);

        assert!(matches!(
            TrendEngine::new().compare(&own, &bench, day(1)),
            Err(AnalyticsError::InvalidInput(_))
        ));
    }
}
