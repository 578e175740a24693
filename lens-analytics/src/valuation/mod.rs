//! Valuation Module.
//!
//! Discounted-cash-flow valuation from the latest reported free cash flow.
//!
//! # Usage
//!
//! ```ignore
//! use lens_analytics::valuation::{DcfAssumptions, ValuationEngine};
//!
//! let engine = ValuationEngine::with_assumptions(DcfAssumptions::new(0.10, 0.05, 5));
//! let result = engine.dcf(1.14e9, Some(2.3e9))?;
//!
//! println!("Intrinsic value: {:.2}B", result.in_billions());
//! ```

pub mod dcf;
pub mod types;

pub use dcf::ValuationEngine;
pub use types::{DcfAssumptions, ProjectedCashFlow, ValuationResult};
