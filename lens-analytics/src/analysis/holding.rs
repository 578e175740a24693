//! Return on a personal holding of the instrument.

use chrono::NaiveDate;
use serde::Serialize;

use super::trend::TrendPoint;
use crate::data::PriceSeries;
use crate::error::{AnalyticsError, Result};

/// Current value of a position against its purchase price.
#[derive(Debug, Clone, Serialize)]
pub struct HoldingReturn {
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
    /// Latest close
    pub current_price: f64,
    pub as_of: NaiveDate,
    /// (current - purchase) / purchase, in percent
    pub roi_percent: f64,
    /// Closes from the purchase date onwards
    pub closes_since_purchase: Vec<TrendPoint>,
}

/// ROI of a holding bought at `purchase_price` on `purchase_date`.
pub fn holding_return(
    series: &PriceSeries,
    purchase_price: f64,
    purchase_date: NaiveDate,
) -> Result<HoldingReturn> {
    if !purchase_price.is_finite() || purchase_price <= 0.0 {
        return Err(AnalyticsError::InvalidInput(format!(
            "purchase price must be positive, got {}",
            purchase_price
        )));
    }

    let since = series.since(purchase_date);
    let latest = since
        .iter()
        .rev()
        .find(|b| b.close.is_finite())
        .ok_or_else(|| {
            AnalyticsError::MissingData(format!("no closes on or after {}", purchase_date))
        })?;

    Ok(HoldingReturn {
        purchase_price,
        purchase_date,
        current_price: latest.close,
        as_of: latest.date,
        roi_percent: (latest.close - purchase_price) / purchase_price * 100.0,
        closes_since_purchase: since
            .iter()
            .map(|b| TrendPoint {
                date: b.date,
                value: b.close.is_finite().then_some(b.close),
            })
            .collect(),
    })
}
