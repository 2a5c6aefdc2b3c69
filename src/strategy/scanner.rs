//! Cointegration scanner for identifying tradeable instrument pairs.
//!
//! For every pair drawn from an ordered instrument list the scanner regresses
//! one close series on the other, builds the residual spread and tests it for
//! stationarity. Accepted pairs carry a point-in-time spread snapshot (mean,
//! sample std and z-score series) that the signal generator reads.

use crate::config::ScannerConfig;
use crate::data::InstrumentSeries;
use crate::stats::{mean, ols_fit, sample_std, AugmentedDickeyFuller, StationarityTest};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, trace};

/// Minimum number of aligned observations before a pair is tested.
pub const MIN_ALIGNED_SAMPLES: usize = 200;

/// A spread is accepted when its stationarity p-value is below this level.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Relative size below which a spread standard deviation counts as zero.
const DEGENERATE_STD_TOLERANCE: f64 = 1e-12;

/// Why a pair produced no result. These are normal outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PairRejection {
    /// One of the instruments has no price series
    MissingSeries,
    /// Fewer aligned observations than the sample floor
    InsufficientData { aligned: usize },
    /// Spread (or regressor) has no variance
    DegenerateSpread,
    /// Stationarity p-value at or above the significance level
    NotSignificant { p_value: f64 },
}

/// An accepted pair with its spread snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CointegrationResult {
    pub sym1: String,
    pub sym2: String,
    /// Slope of `price(sym1) = a + hedge_ratio * price(sym2)`
    pub hedge_ratio: f64,
    pub p_value: f64,
    /// `price(sym1) - hedge_ratio * price(sym2)` on common timestamps
    pub spread: Vec<f64>,
    pub mean: f64,
    /// Sample standard deviation (divisor `n - 1`)
    pub std: f64,
    pub zscore: Vec<f64>,
}

impl CointegrationResult {
    /// Z-score of the latest aligned observation.
    pub fn current_zscore(&self) -> Option<f64> {
        self.zscore.last().copied()
    }

    /// Spread value of the latest aligned observation.
    pub fn current_spread(&self) -> Option<f64> {
        self.spread.last().copied()
    }
}

/// A pair that was tested and rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedPair {
    pub sym1: String,
    pub sym2: String,
    pub reason: PairRejection,
}

/// Outcome of one scan, in pair order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub accepted: Vec<CointegrationResult>,
    pub rejected: Vec<RejectedPair>,
    pub pairs_tested: usize,
}

/// Enumerate unordered pairs `(list[i], list[j])`, `i < j`, in list order.
///
/// Repeated instruments are considered once, at their first position.
pub fn candidate_pairs(instruments: &[String]) -> Vec<(String, String)> {
    let mut unique: Vec<&String> = Vec::with_capacity(instruments.len());
    for name in instruments {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }

    let mut pairs = Vec::with_capacity(unique.len() * unique.len().saturating_sub(1) / 2);
    for (i, a) in unique.iter().enumerate() {
        for b in &unique[i + 1..] {
            pairs.push(((*a).clone(), (*b).clone()));
        }
    }
    pairs
}

/// Per-pair evaluation, shared by the sequential and parallel scans.
#[derive(Clone)]
struct PairEvaluator {
    min_aligned_samples: usize,
    significance: f64,
    test: Arc<dyn StationarityTest>,
}

impl PairEvaluator {
    fn evaluate(
        &self,
        sym1: &str,
        sym2: &str,
        series: &HashMap<String, InstrumentSeries>,
    ) -> Result<CointegrationResult, PairRejection> {
        let (Some(s1), Some(s2)) = (series.get(sym1), series.get(sym2)) else {
            return Err(PairRejection::MissingSeries);
        };

        let (y, x) = s1.align_with(s2);
        if y.len() < self.min_aligned_samples {
            return Err(PairRejection::InsufficientData { aligned: y.len() });
        }

        // Only the slope is kept; the spread below still contains the intercept.
        let fit = ols_fit(&y, &x).ok_or(PairRejection::DegenerateSpread)?;
        let hedge_ratio = fit.slope;
        let spread: Vec<f64> = y
            .iter()
            .zip(x.iter())
            .map(|(yi, xi)| yi - hedge_ratio * xi)
            .collect();

        let spread_mean = mean(&spread).ok_or(PairRejection::DegenerateSpread)?;
        let spread_std = sample_std(&spread).ok_or(PairRejection::DegenerateSpread)?;
        let degenerate = !spread_std.is_finite()
            || spread_std <= DEGENERATE_STD_TOLERANCE * (1.0 + spread_mean.abs());

        if degenerate {
            return Err(PairRejection::DegenerateSpread);
        }

        // An untestable spread is never accepted.
        let p_value = self
            .test
            .p_value(&spread)
            .filter(|p| p.is_finite())
            .unwrap_or(1.0);
        if p_value >= self.significance {
            return Err(PairRejection::NotSignificant { p_value });
        }

        let zscore = spread
            .iter()
            .map(|s| (s - spread_mean) / spread_std)
            .collect();

        Ok(CointegrationResult {
            sym1: sym1.to_string(),
            sym2: sym2.to_string(),
            hedge_ratio,
            p_value,
            spread,
            mean: spread_mean,
            std: spread_std,
            zscore,
        })
    }
}

type PairOutcome = (String, String, Result<CointegrationResult, PairRejection>);

/// Scans instrument pairs for cointegration.
pub struct CointegrationScanner {
    evaluator: PairEvaluator,
    max_workers: usize,
}

impl CointegrationScanner {
    /// Scanner using the augmented Dickey-Fuller test.
    pub fn new(config: ScannerConfig) -> Self {
        Self::with_test(config, Arc::new(AugmentedDickeyFuller::new()))
    }

    /// Scanner using a caller-supplied stationarity test.
    pub fn with_test(config: ScannerConfig, test: Arc<dyn StationarityTest>) -> Self {
        Self {
            evaluator: PairEvaluator {
                min_aligned_samples: config.min_aligned_samples,
                significance: config.significance,
                test,
            },
            max_workers: config.max_workers.max(1),
        }
    }

    /// Evaluate every pair sequentially.
    #[instrument(skip(self, instruments, series), fields(instruments = instruments.len()))]
    pub fn scan(
        &self,
        instruments: &[String],
        series: &HashMap<String, InstrumentSeries>,
    ) -> ScanReport {
        let outcomes = candidate_pairs(instruments)
            .into_iter()
            .map(|(sym1, sym2)| {
                let outcome = self.evaluator.evaluate(&sym1, &sym2, series);
                (sym1, sym2, outcome)
            })
            .collect();
        summarize(outcomes)
    }

    /// Evaluate pairs on a bounded pool of blocking workers.
    ///
    /// The report lists pairs in the same order as [`scan`](Self::scan).
    #[instrument(skip(self, instruments, series), fields(instruments = instruments.len(), workers = self.max_workers))]
    pub async fn scan_parallel(
        &self,
        instruments: &[String],
        series: &HashMap<String, InstrumentSeries>,
    ) -> Result<ScanReport> {
        let pairs = candidate_pairs(instruments);
        let shared = Arc::new(series.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_workers));

        let mut handles = Vec::with_capacity(pairs.len());
        for (sym1, sym2) in pairs {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("Scanner worker pool closed")?;
            let evaluator = self.evaluator.clone();
            let series = Arc::clone(&shared);

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let outcome = evaluator.evaluate(&sym1, &sym2, &series);
                (sym1, sym2, outcome)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.context("Pair evaluation task panicked")?);
        }

        Ok(summarize(outcomes))
    }
}

/// Split outcomes into accepted/rejected and log the scan summary.
fn summarize(outcomes: Vec<PairOutcome>) -> ScanReport {
    let mut report = ScanReport {
        pairs_tested: outcomes.len(),
        ..Default::default()
    };

    let mut rejected_missing_series = 0usize;
    let mut rejected_insufficient_data = 0usize;
    let mut rejected_degenerate = 0usize;
    let mut rejected_not_significant = 0usize;

    for (sym1, sym2, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                info!(
                    %sym1,
                    %sym2,
                    p_value = result.p_value,
                    hedge_ratio = result.hedge_ratio,
                    zscore = result.current_zscore(),
                    "Cointegrated pair"
                );
                report.accepted.push(result);
            }
            Err(reason) => {
                match reason {
                    PairRejection::MissingSeries => {
                        rejected_missing_series += 1;
                        debug!(%sym1, %sym2, "Rejected: missing price series");
                    }
                    PairRejection::InsufficientData { aligned } => {
                        rejected_insufficient_data += 1;
                        debug!(%sym1, %sym2, aligned, "Rejected: insufficient aligned data");
                    }
                    PairRejection::DegenerateSpread => {
                        rejected_degenerate += 1;
                        debug!(%sym1, %sym2, "Rejected: spread has no variance");
                    }
                    PairRejection::NotSignificant { p_value } => {
                        rejected_not_significant += 1;
                        trace!(%sym1, %sym2, p_value, "Rejected: spread not stationary");
                    }
                }
                report.rejected.push(RejectedPair { sym1, sym2, reason });
            }
        }
    }

    info!(
        pairs_tested = report.pairs_tested,
        accepted = report.accepted.len(),
        rejected_missing_series,
        rejected_insufficient_data,
        rejected_degenerate,
        rejected_not_significant,
        "Cointegration scan complete"
    );

    report
}
