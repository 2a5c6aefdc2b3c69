//! # Pairs Trader
//!
//! Statistical-arbitrage core that finds cointegrated instrument pairs and
//! trades mean reversion of their spread.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `data`: Closing-price series and their providers (in-memory, CSV)
//! - `stats`: OLS regression and the Augmented Dickey-Fuller test
//! - `strategy`: Pair scanning, signals, volume normalization and execution
//! - `venue`: Execution venue abstraction, session handling and paper venue
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod data;
pub mod stats;
pub mod strategy;
pub mod utils;
pub mod venue;

pub use config::Config;
