//! Close-price prediction.
//!
//! A linear model maps each session's (open, high, low, volume) to its close.
//! Rows are split by a seeded shuffle, the model is fitted on the training
//! side only and scored on the held-out side.

pub mod engine;
pub mod ols;

pub use engine::{
    evaluate, split_indices, HeldOutPoint, PredictionEngine, PredictionResult, Split, FEATURES,
};
pub use ols::LinearModel;
