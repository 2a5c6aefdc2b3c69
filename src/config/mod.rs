//! Configuration management for the pairs trader.
//!
//! Loads settings from environment variables and config files.

use crate::strategy::executor::LegFailurePolicy;
use crate::strategy::scanner::{MIN_ALIGNED_SAMPLES, SIGNIFICANCE_LEVEL};
use crate::venue::{FillPolicy, SessionSettings, TimeInForce, VolumeConstraint};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Instruments and history window
    #[serde(default)]
    pub universe: UniverseConfig,
    /// Cointegration test parameters
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Entry band on the spread z-score
    #[serde(default)]
    pub signal: SignalConfig,
    /// Order sizing and leg sequencing
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Paper venue simulation
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Ordered instrument list; pairs follow this order.
    /// Empty means every instrument the price provider holds, sorted.
    #[serde(default)]
    pub instruments: Vec<String>,
    /// Number of most recent bars per instrument
    #[serde(default = "default_bar_count")]
    pub bar_count: usize,
    /// CSV file with `timestamp,symbol,close` rows
    #[serde(default)]
    pub data_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Minimum aligned observations per pair
    #[serde(default = "default_min_aligned_samples")]
    pub min_aligned_samples: usize,
    /// Accept a pair when the stationarity p-value is below this
    #[serde(default = "default_significance")]
    pub significance: f64,
    /// Parallel pair evaluations (1 = sequential)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Smallest |z| that triggers entry
    #[serde(default = "default_entry_z")]
    pub entry_z: f64,
    /// |z| at or above this is treated as a regime break
    #[serde(default = "default_regime_break_z")]
    pub regime_break_z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Leg 1 volume; leg 2 is `|hedge_ratio| * base_lot`
    #[serde(default = "default_base_lot")]
    pub base_lot: Decimal,
    /// Settling pause between leg 1 and leg 2
    #[serde(default = "default_leg_delay_ms")]
    pub leg_delay_ms: u64,
    #[serde(default = "default_leg_failure_policy")]
    pub leg_failure_policy: LegFailurePolicy,
    /// Flatten the filled leg when its partner fails
    #[serde(default = "default_true")]
    pub unwind_on_second_leg_failure: bool,
    /// Per-call venue timeout (none by default)
    #[serde(default)]
    pub venue_timeout_ms: Option<u64>,
    /// Attempts per venue call; only transport errors are retried.
    /// Values above 1 also retry sends, which can duplicate a fill when the
    /// venue accepted the order before the transport failed.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
    #[serde(default = "default_time_in_force")]
    pub time_in_force: TimeInForce,
    #[serde(default = "default_fill_policy")]
    pub fill_policy: FillPolicy,
    /// Tag stamped on every order for audit
    #[serde(default = "default_strategy_tag")]
    pub strategy_tag: u64,
    #[serde(default = "default_order_comment")]
    pub order_comment: String,
    /// Accepted slippage in price points
    #[serde(default = "default_max_deviation_points")]
    pub max_deviation_points: u32,
    /// Stop-loss distance from the entry spread, in spread deviations
    #[serde(default = "default_stop_loss_sigma")]
    pub stop_loss_sigma: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Full bid/ask spread in basis points
    #[serde(default = "default_spread_bps")]
    pub spread_bps: Decimal,
    #[serde(default = "default_volume_min")]
    pub volume_min: Decimal,
    #[serde(default = "default_volume_max")]
    pub volume_max: Decimal,
    #[serde(default = "default_volume_step")]
    pub volume_step: Decimal,
}

// Default value functions
fn default_bar_count() -> usize {
    1000
}

fn default_min_aligned_samples() -> usize {
    MIN_ALIGNED_SAMPLES
}

fn default_significance() -> f64 {
    SIGNIFICANCE_LEVEL
}

fn default_max_workers() -> usize {
    4
}

fn default_entry_z() -> f64 {
    2.0
}

fn default_regime_break_z() -> f64 {
    3.0
}

fn default_base_lot() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_leg_delay_ms() -> u64 {
    1000
}

fn default_leg_failure_policy() -> LegFailurePolicy {
    LegFailurePolicy::AbortSecondLeg
}

fn default_true() -> bool {
    true
}

fn default_max_send_attempts() -> u32 {
    1
}

fn default_time_in_force() -> TimeInForce {
    TimeInForce::Gtc
}

fn default_fill_policy() -> FillPolicy {
    FillPolicy::FillOrKill
}

fn default_strategy_tag() -> u64 {
    123456
}

fn default_order_comment() -> String {
    "Spread Entry".to_string()
}

fn default_max_deviation_points() -> u32 {
    20
}

fn default_stop_loss_sigma() -> f64 {
    1.5
}

fn default_spread_bps() -> Decimal {
    Decimal::new(2, 0)
}

fn default_volume_min() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_volume_max() -> Decimal {
    Decimal::new(100, 0)
}

fn default_volume_step() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("PAIRS"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.scanner.significance > 0.0 && self.scanner.significance < 1.0,
            "significance must be between 0 and 1"
        );

        anyhow::ensure!(
            self.scanner.min_aligned_samples >= 3,
            "min_aligned_samples must be at least 3"
        );

        anyhow::ensure!(self.scanner.max_workers >= 1, "max_workers must be >= 1");

        anyhow::ensure!(self.signal.entry_z > 0.0, "entry_z must be positive");

        anyhow::ensure!(
            self.signal.regime_break_z > self.signal.entry_z,
            "regime_break_z must be greater than entry_z"
        );

        anyhow::ensure!(
            self.execution.base_lot > Decimal::ZERO,
            "base_lot must be positive"
        );

        anyhow::ensure!(
            self.execution.max_send_attempts >= 1,
            "max_send_attempts must be >= 1"
        );

        anyhow::ensure!(
            self.execution.stop_loss_sigma.is_finite() && self.execution.stop_loss_sigma >= 0.0,
            "stop_loss_sigma must be a non-negative number"
        );

        if let Some(defect) = self.paper.volume_constraint().defect() {
            anyhow::bail!("paper volume constraint is invalid: {}", defect);
        }

        Ok(())
    }
}

impl ExecutionConfig {
    /// Timeout and retry settings for the venue session.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            timeout: self.venue_timeout_ms.map(Duration::from_millis),
            max_attempts: self.max_send_attempts,
        }
    }
}

impl PaperConfig {
    pub fn volume_constraint(&self) -> VolumeConstraint {
        VolumeConstraint::new(self.volume_min, self.volume_max, self.volume_step)
    }
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            bar_count: default_bar_count(),
            data_path: None,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_aligned_samples: default_min_aligned_samples(),
            significance: default_significance(),
            max_workers: default_max_workers(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            entry_z: default_entry_z(),
            regime_break_z: default_regime_break_z(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_lot: default_base_lot(),
            leg_delay_ms: default_leg_delay_ms(),
            leg_failure_policy: default_leg_failure_policy(),
            unwind_on_second_leg_failure: default_true(),
            venue_timeout_ms: None,
            max_send_attempts: default_max_send_attempts(),
            time_in_force: default_time_in_force(),
            fill_policy: default_fill_policy(),
            strategy_tag: default_strategy_tag(),
            order_comment: default_order_comment(),
            max_deviation_points: default_max_deviation_points(),
            stop_loss_sigma: default_stop_loss_sigma(),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            spread_bps: default_spread_bps(),
            volume_min: default_volume_min(),
            volume_max: default_volume_max(),
            volume_step: default_volume_step(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_preserve_single_attempt_without_timeout() {
        let config = Config::default();
        assert_eq!(config.universe.bar_count, 1000);
        assert_eq!(config.scanner.min_aligned_samples, 200);
        assert_eq!(config.execution.base_lot, dec!(0.1));
        assert_eq!(
            config.execution.leg_failure_policy,
            LegFailurePolicy::AbortSecondLeg
        );

        let settings = config.execution.session_settings();
        assert_eq!(settings.timeout, None);
        assert_eq!(settings.max_attempts, 1);
    }

    #[test]
    fn test_invalid_signal_band_rejected() {
        let mut config = Config::default();
        config.signal.regime_break_z = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_scanner_settings_rejected() {
        let mut config = Config::default();
        config.scanner.significance = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scanner.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_execution_settings_rejected() {
        let mut config = Config::default();
        config.execution.base_lot = Decimal::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.execution.max_send_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.paper.volume_step = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_sections() {
        let json = r#"{
            "universe": { "instruments": ["EURUSD", "GBPUSD"] },
            "execution": { "leg_failure_policy": "send_regardless", "venue_timeout_ms": 2500 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.universe.instruments, vec!["EURUSD", "GBPUSD"]);
        assert_eq!(config.universe.bar_count, 1000);
        assert_eq!(
            config.execution.leg_failure_policy,
            LegFailurePolicy::SendRegardless
        );
        assert_eq!(
            config.execution.session_settings().timeout,
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.execution.fill_policy, FillPolicy::FillOrKill);
    }
}
