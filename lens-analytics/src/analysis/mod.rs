//! Statement and price analytics.
//!
//! - **ratios**: profitability, liquidity, efficiency, leverage and market
//!   ratios from the latest fiscal period
//! - **trend**: moving averages, daily returns, benchmark comparison
//! - **holding**: return on a personal position

pub mod holding;
pub mod ratios;
pub mod trend;

pub use holding::{holding_return, HoldingReturn};
pub use ratios::{RatioEngine, RatioReport, RatioValue, UndefinedReason};
pub use trend::{MovingAverage, TrendComparison, TrendEngine, TrendPoint};
