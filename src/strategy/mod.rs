//! Pairs trading strategy.
//!
//! - Cointegration scanning of instrument pairs
//! - Z-score entry signals
//! - Volume normalization against venue constraints
//! - Two-leg spread execution
//! - The cycle tying these together

pub mod cycle;
pub mod executor;
pub mod normalizer;
pub mod scanner;
pub mod signal;

pub use cycle::{AbortedSignal, CycleReport, TradingCycle};
pub use executor::{
    ExecutionCoordinator, ExecutionError, ExecutionOutcome, ExecutionRecord, LegFailurePolicy,
    LegId, LegStatus, OrderLeg, SpreadTargets,
};
pub use normalizer::{UnusableConstraint, VolumeNormalizer};
pub use scanner::{
    candidate_pairs, CointegrationResult, CointegrationScanner, PairRejection, RejectedPair,
    ScanReport,
};
pub use signal::{Signal, SignalGenerator, SpreadDirection};
