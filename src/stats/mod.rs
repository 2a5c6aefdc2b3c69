//! Statistical primitives for cointegration analysis.

pub mod adf;
pub mod regression;

pub use adf::{mackinnon_p_value, AdfOutcome, AugmentedDickeyFuller, StationarityTest};
pub use regression::{mean, ols_fit, sample_std, LinearFit};
