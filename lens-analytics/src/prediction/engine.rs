//! Seeded train/test split, OLS fit and held-out evaluation.

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use super::ols::LinearModel;
use crate::data::PriceSeries;
use crate::error::{AnalyticsError, Result};

/// Feature columns, in coefficient order.
pub const FEATURES: [&str; 4] = ["open", "high", "low", "volume"];

const MIN_ROWS: usize = 2;

/// One usable session: features and same-day close.
#[derive(Debug, Clone, Copy)]
struct Observation {
    date: NaiveDate,
    features: [f64; 4],
    close: f64,
}

/// Row indices of a seeded partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..rows` with `seed` and hold out `ceil(rows × test_fraction)`.
pub fn split_indices(rows: usize, test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(AnalyticsError::InvalidInput(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let test_size = test_size(rows, test_fraction);
    if rows < MIN_ROWS || test_size == 0 || test_size >= rows {
        return Err(AnalyticsError::InsufficientData {
            rows,
            required: required_rows(test_fraction),
        });
    }

    let mut indices: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(test_size);
    Ok(Split {
        train,
        test: indices,
    })
}

fn test_size(rows: usize, test_fraction: f64) -> usize {
    (rows as f64 * test_fraction).ceil() as usize
}

/// Smallest row count that leaves both sides of the split non-empty.
fn required_rows(test_fraction: f64) -> usize {
    (MIN_ROWS..)
        .find(|&n| test_size(n, test_fraction) < n)
        .unwrap_or(MIN_ROWS)
}

/// Mean squared error and coefficient of determination.
///
/// With a constant target R² is 1 for a perfect fit and 0 otherwise.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> (f64, f64) {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return (0.0, 0.0);
    }

    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();

    let mse = ss_res / n as f64;
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };
    (mse, r_squared)
}

/// One held-out session for an actual-vs-predicted chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeldOutPoint {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

/// Fitted model and its held-out metrics.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub seed: u64,
    pub test_fraction: f64,
    pub usable_rows: usize,
    pub train_rows: usize,
    pub features: [&'static str; 4],
    pub model: LinearModel,
    pub mse: f64,
    pub r_squared: f64,
    pub held_out: Vec<HeldOutPoint>,
}

/// Same-session close from (open, high, low, volume).
#[derive(Debug, Clone, Copy)]
pub struct PredictionEngine {
    seed: u64,
    test_fraction: f64,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
        }
    }
}

impl PredictionEngine {
    pub fn new(seed: u64, test_fraction: f64) -> Self {
        Self {
            seed,
            test_fraction,
        }
    }

    pub fn fit_and_evaluate(&self, series: &PriceSeries) -> Result<PredictionResult> {
        let rows = usable_rows(series);
        let split = split_indices(rows.len(), self.test_fraction, self.seed)?;

        let train_y: Array1<f64> = split.train.iter().map(|&i| rows[i].close).collect();
        let model = LinearModel::fit(&feature_matrix(&rows, &split.train), &train_y)?;

        let predicted = model.predict(&feature_matrix(&rows, &split.test));
        let held_out: Vec<HeldOutPoint> = split
            .test
            .iter()
            .zip(predicted.iter())
            .map(|(&i, &predicted)| HeldOutPoint {
                date: rows[i].date,
                actual: rows[i].close,
                predicted,
            })
            .collect();

        let actual: Vec<f64> = held_out.iter().map(|p| p.actual).collect();
        let predicted: Vec<f64> = held_out.iter().map(|p| p.predicted).collect();
        let (mse, r_squared) = evaluate(&actual, &predicted);

        debug!(
            rows = rows.len(),
            train = split.train.len(),
            test = split.test.len(),
            mse,
            r_squared,
            "Prediction model evaluated"
        );

        Ok(PredictionResult {
            seed: self.seed,
            test_fraction: self.test_fraction,
            usable_rows: rows.len(),
            train_rows: split.train.len(),
            features: FEATURES,
            model,
            mse,
            r_squared,
            held_out,
        })
    }
}

/// Feature rows for `indices`, one column per entry of `FEATURES`.
fn feature_matrix(rows: &[Observation], indices: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((indices.len(), FEATURES.len()), |(r, c)| {
        rows[indices[r]].features[c]
    })
}

/// Sessions after the first with every field finite.
fn usable_rows(series: &PriceSeries) -> Vec<Observation> {
    series
        .bars()
        .iter()
        .skip(1)
        .filter(|b| b.is_complete())
        .map(|b| Observation {
            date: b.date,
            features: [b.open, b.high, b.low, b.volume],
            close: b.close,
        })
        .collect()
}
