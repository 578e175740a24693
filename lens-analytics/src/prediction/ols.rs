//! Ordinary least squares with intercept.
//!
//! Features are standardised on the training rows and fitted with linfa's
//! `LinearRegression`. A column with no variance, or one that is a linear
//! combination of earlier columns, is left out of the fit and gets
//! coefficient 0.

use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

use crate::error::{AnalyticsError, Result};

/// Squared residual norm per row below which a standardised column counts as
/// dependent on the columns kept before it.
const DEPENDENCE_TOLERANCE: f64 = 1e-10;

/// Fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearModel {
    /// Intercept on the raw feature scale
    pub intercept: f64,
    /// Slopes on the raw feature scale, in feature order
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    /// Fit `y ~ 1 + x` by least squares, one row of `features` per target.
    pub fn fit(features: &Array2<f64>, targets: &Array1<f64>) -> Result<Self> {
        let (rows, columns) = features.dim();
        if rows == 0 || rows != targets.len() {
            return Err(AnalyticsError::InvalidInput(format!(
                "{} feature rows for {} targets",
                rows,
                targets.len()
            )));
        }

        let means = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(columns));
        let scales = features.std_axis(Axis(0), 0.0);
        let standardised = (features - &means) / &scales.mapv(|s| if s > 0.0 { s } else { 1.0 });

        let kept = independent_columns(&standardised, &scales);
        let mut coefficients = vec![0.0; columns];
        let mut intercept = targets.mean().unwrap_or(0.0);

        if !kept.is_empty() {
            let dataset = DatasetBase::new(standardised.select(Axis(1), &kept), targets.clone());
            let fitted = LinearRegression::new()
                .fit(&dataset)
                .map_err(|e| AnalyticsError::ModelFit(e.to_string()))?;

            intercept = fitted.intercept();
            for (&j, &beta) in kept.iter().zip(fitted.params().iter()) {
                coefficients[j] = beta / scales[j];
                intercept -= coefficients[j] * means[j];
            }
        }

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    /// Predicted target for each row of `features`.
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        features.dot(&Array1::from(self.coefficients.clone())) + self.intercept
    }
}

/// Indices of varying columns not spanned by the varying columns before them.
fn independent_columns(standardised: &Array2<f64>, scales: &Array1<f64>) -> Vec<usize> {
    let rows = standardised.nrows() as f64;
    let mut basis: Vec<Array1<f64>> = Vec::new();
    let mut kept = Vec::new();

    for (j, column) in standardised.axis_iter(Axis(1)).enumerate() {
        if !(scales[j] > 0.0 && scales[j].is_finite()) {
            continue;
        }
        let mut residual = column.to_owned();
        for unit in &basis {
            let projection = residual.dot(unit);
            residual.scaled_add(-projection, unit);
        }
        let norm_sq = residual.dot(&residual);
        if norm_sq / rows > DEPENDENCE_TOLERANCE {
            basis.push(residual / norm_sq.sqrt());
            kept.push(j);
        }
    }
    kept
}
