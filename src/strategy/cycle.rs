//! One scan-signal-execute pass.

use super::executor::{ExecutionCoordinator, ExecutionError, ExecutionRecord};
use super::scanner::{CointegrationScanner, ScanReport};
use super::signal::{Signal, SignalGenerator};
use crate::config::Config;
use crate::data::PriceSeriesProvider;
use crate::venue::{ExecutionVenue, SessionSettings, VenueSession};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// A signal that was dropped before any order was sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbortedSignal {
    pub sym1: String,
    pub sym2: String,
    pub reason: String,
}

/// Everything one cycle produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Requested instruments without price data
    pub unresolved: Vec<String>,
    pub scan: ScanReport,
    pub signals: Vec<Signal>,
    pub executions: Vec<ExecutionRecord>,
    pub aborted: Vec<AbortedSignal>,
}

impl CycleReport {
    /// Executions that left one leg unhedged.
    pub fn partial_executions(&self) -> Vec<&ExecutionRecord> {
        self.executions
            .iter()
            .filter(|r| r.ensure_hedged().is_err())
            .collect()
    }
}

/// Wires the price provider, scanner, signal generator and coordinator.
pub struct TradingCycle {
    provider: Arc<dyn PriceSeriesProvider>,
    scanner: CointegrationScanner,
    generator: SignalGenerator,
    coordinator: ExecutionCoordinator,
    instruments: Vec<String>,
    bar_count: usize,
    parallel: bool,
    session_settings: SessionSettings,
}

impl TradingCycle {
    pub fn new(config: &Config, provider: Arc<dyn PriceSeriesProvider>) -> Self {
        Self::with_scanner(config, provider, CointegrationScanner::new(config.scanner))
    }

    /// Cycle with a preconfigured scanner, e.g. one using another stationarity test.
    pub fn with_scanner(
        config: &Config,
        provider: Arc<dyn PriceSeriesProvider>,
        scanner: CointegrationScanner,
    ) -> Self {
        Self {
            provider,
            scanner,
            generator: SignalGenerator::new(config.signal),
            coordinator: ExecutionCoordinator::new(config.execution.clone()),
            instruments: config.universe.instruments.clone(),
            bar_count: config.universe.bar_count,
            parallel: config.scanner.max_workers > 1,
            session_settings: config.execution.session_settings(),
        }
    }

    /// Fetch prices, scan pairs and derive signals. Sends nothing.
    #[instrument(skip(self))]
    pub async fn evaluate(&self) -> Result<CycleReport> {
        let fetch = self
            .provider
            .fetch(&self.instruments, self.bar_count)
            .await
            .context("Failed to fetch price series")?;

        if !fetch.unresolved.is_empty() {
            warn!(unresolved = ?fetch.unresolved, "Some instruments have no price data");
        }

        // Unresolved instruments stay in the list and surface as missing-series rejections.
        let instruments = if self.instruments.is_empty() {
            fetch.instruments()
        } else {
            self.instruments.clone()
        };

        let scan = if self.parallel {
            self.scanner
                .scan_parallel(&instruments, &fetch.series)
                .await?
        } else {
            self.scanner.scan(&instruments, &fetch.series)
        };

        let signals = self.generator.generate(&scan.accepted);

        info!(
            instruments = instruments.len(),
            accepted = scan.accepted.len(),
            signals = signals.len(),
            "Cycle evaluated"
        );

        Ok(CycleReport {
            unresolved: fetch.unresolved,
            scan,
            signals,
            ..Default::default()
        })
    }

    /// Evaluate, then execute every signal through a fresh venue session.
    ///
    /// The session is closed before returning, whatever the executions did.
    #[instrument(skip(self, venue))]
    pub async fn run(&self, venue: Arc<dyn ExecutionVenue>) -> Result<CycleReport> {
        let mut report = self.evaluate().await?;
        if report.signals.is_empty() {
            info!("No signals this cycle");
            return Ok(report);
        }

        let session = VenueSession::open(venue, self.session_settings)
            .await
            .context("Failed to open venue session")?;

        for signal in &report.signals {
            match self.coordinator.execute(&session, signal).await {
                Ok(record) => {
                    if let Err(e) = record.ensure_hedged() {
                        error!(
                            sym1 = %record.sym1,
                            sym2 = %record.sym2,
                            error = %e,
                            compensated = record.compensation.as_ref().map(|c| c.status.is_sent()),
                            "Unhedged exposure after execution"
                        );
                    }
                    report.executions.push(record);
                }
                Err(e) => {
                    warn!(
                        sym1 = %signal.pair.sym1,
                        sym2 = %signal.pair.sym2,
                        error = %e,
                        "Signal aborted before sending"
                    );
                    report.aborted.push(aborted(signal, &e));
                }
            }
        }

        if let Err(e) = session.close().await {
            warn!(error = %e, "Venue session did not close cleanly");
        }

        let filled = report.executions.iter().filter(|r| r.is_success()).count();
        info!(
            signals = report.signals.len(),
            filled,
            partial = report.partial_executions().len(),
            aborted = report.aborted.len(),
            "Cycle complete"
        );

        Ok(report)
    }
}

fn aborted(signal: &Signal, error: &ExecutionError) -> AbortedSignal {
    AbortedSignal {
        sym1: signal.pair.sym1.clone(),
        sym2: signal.pair.sym2.clone(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InMemoryPriceProvider, InstrumentSeries};
    use crate::stats::StationarityTest;
    use crate::strategy::executor::ExecutionOutcome;
    use crate::strategy::scanner::PairRejection;
    use crate::venue::{PaperVenue, ScriptedResponse, VolumeConstraint};
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FixedPValue(f64);

    impl StationarityTest for FixedPValue {
        fn p_value(&self, _series: &[f64]) -> Option<f64> {
            Some(self.0)
        }
    }

    /// A and B with hedge ratio 1.3 and a current z-score near 2.4.
    fn provider() -> InMemoryPriceProvider {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut b = Vec::new();
        let mut r = Vec::new();
        for t in 0..248 {
            b.push(100.0 + 0.5 * (t / 2) as f64);
            r.push(if t % 2 == 0 { 1.0 } else { -1.0 });
        }
        let b_mean = b.iter().sum::<f64>() / b.len() as f64;
        b.extend([b_mean, b_mean]);
        r.extend([-2.45, 2.45]);
        let a: Vec<f64> = b.iter().zip(&r).map(|(bi, ri)| 10.0 + 1.3 * bi + ri).collect();

        let points = |v: &[f64]| -> Vec<_> {
            v.iter()
                .enumerate()
                .map(|(i, c)| (start + Duration::days(i as i64), *c))
                .collect()
        };
        InMemoryPriceProvider::new()
            .with_series(InstrumentSeries::from_points("A", points(&a)))
            .with_series(InstrumentSeries::from_points("B", points(&b)))
    }

    fn config(instruments: &[&str]) -> Config {
        let mut config = Config::default();
        config.universe.instruments = instruments.iter().map(|s| s.to_string()).collect();
        config.scanner.max_workers = 1;
        config
    }

    fn cycle(config: &Config) -> TradingCycle {
        let scanner =
            CointegrationScanner::with_test(config.scanner, Arc::new(FixedPValue(0.01)));
        TradingCycle::with_scanner(config, Arc::new(provider()), scanner)
    }

    async fn paper_venue() -> Arc<PaperVenue> {
        let venue = PaperVenue::new(
            dec!(2),
            Some(VolumeConstraint::new(dec!(0.01), dec!(100), dec!(0.01))),
        );
        venue
            .set_mids(HashMap::from([
                ("A".to_string(), dec!(180)),
                ("B".to_string(), dec!(131)),
            ]))
            .await;
        Arc::new(venue)
    }

    #[tokio::test]
    async fn test_evaluate_reports_missing_instruments() {
        let config = config(&["A", "B", "C"]);
        let report = cycle(&config).evaluate().await.unwrap();

        assert_eq!(report.unresolved, vec!["C".to_string()]);
        assert_eq!(report.scan.pairs_tested, 3);
        assert_eq!(report.scan.accepted.len(), 1);
        assert!(report
            .scan
            .rejected
            .iter()
            .all(|r| r.reason == PairRejection::MissingSeries));
        assert_eq!(report.signals.len(), 1);
        assert!(report.executions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_executes_and_closes_session() {
        let config = config(&["A", "B"]);
        let venue = paper_venue().await;

        let report = cycle(&config).run(venue.clone()).await.unwrap();

        assert_eq!(report.executions.len(), 1);
        assert_eq!(report.executions[0].outcome, ExecutionOutcome::BothFilled);
        assert!(report.partial_executions().is_empty());
        assert!(!venue.is_connected());
        assert_eq!(venue.connection_counts(), (1, 1));
        // ShortSpread: sell A, buy B
        assert_eq!(venue.net_volume("A").await, dec!(-0.1));
        assert_eq!(venue.net_volume("B").await, dec!(0.13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_closes_session_after_partial_failure() {
        let config = config(&["A", "B"]);
        let venue = paper_venue().await;
        venue.script("B", vec![ScriptedResponse::Reject(10019)]).await;

        let report = cycle(&config).run(venue.clone()).await.unwrap();

        assert_eq!(report.partial_executions().len(), 1);
        assert!(!venue.is_connected());
        // Leg 1 was unwound
        assert_eq!(venue.net_volume("A").await, dec!(0));
    }

    #[tokio::test]
    async fn test_aborted_signal_does_not_stop_cycle() {
        let config = config(&["A", "B"]);
        // No default constraint and no mids: constraint lookup fails.
        let venue = Arc::new(PaperVenue::new(dec!(2), None));

        let report = cycle(&config).run(venue.clone()).await.unwrap();
        assert!(report.executions.is_empty());
        assert_eq!(report.aborted.len(), 1);
        assert!(venue.orders().await.is_empty());
        assert!(!venue.is_connected());
    }

    #[tokio::test]
    async fn test_no_signals_skips_session() {
        let mut config = config(&["A", "B"]);
        config.signal.entry_z = 2.5;
        config.signal.regime_break_z = 3.0;
        let venue = paper_venue().await;

        let report = cycle(&config).run(venue.clone()).await.unwrap();
        assert!(report.signals.is_empty());
        assert_eq!(venue.connection_counts(), (0, 0));
    }
}
