//! Entry signals from the current spread z-score.

use super::scanner::CointegrationResult;
use crate::config::SignalConfig;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Which way to trade the spread `sym1 - hedge_ratio * sym2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpreadDirection {
    /// Spread is cheap: buy sym1, sell sym2
    LongSpread,
    /// Spread is rich: sell sym1, buy sym2
    ShortSpread,
}

impl SpreadDirection {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            SpreadDirection::LongSpread => 1.0,
            SpreadDirection::ShortSpread => -1.0,
        }
    }
}

impl fmt::Display for SpreadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadDirection::LongSpread => write!(f, "LONG_SPREAD"),
            SpreadDirection::ShortSpread => write!(f, "SHORT_SPREAD"),
        }
    }
}

/// A pair selected for entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub pair: CointegrationResult,
    pub direction: SpreadDirection,
}

/// Maps current z-scores to entry decisions.
///
/// A signal fires when `entry_z <= |z| < regime_break_z`. Larger deviations
/// are treated as a possible regime break and skipped.
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Direction for a z-score, or `None` outside the entry band.
    pub fn classify(&self, z: f64) -> Option<SpreadDirection> {
        let magnitude = z.abs();
        if !(magnitude >= self.config.entry_z && magnitude < self.config.regime_break_z) {
            return None;
        }
        if z > 0.0 {
            Some(SpreadDirection::ShortSpread)
        } else {
            Some(SpreadDirection::LongSpread)
        }
    }

    /// Signals for accepted pairs, in the order given.
    pub fn generate(&self, pairs: &[CointegrationResult]) -> Vec<Signal> {
        let mut signals = Vec::new();
        for pair in pairs {
            let Some(z) = pair.current_zscore() else {
                continue;
            };
            match self.classify(z) {
                Some(direction) => {
                    info!(
                        sym1 = %pair.sym1,
                        sym2 = %pair.sym2,
                        zscore = z,
                        %direction,
                        "Entry signal"
                    );
                    signals.push(Signal {
                        pair: pair.clone(),
                        direction,
                    });
                }
                None => {
                    debug!(sym1 = %pair.sym1, sym2 = %pair.sym2, zscore = z, "No signal");
                }
            }
        }
        signals
    }
}
