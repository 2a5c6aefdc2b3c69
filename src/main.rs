//! Pairs Trader - Main Entry Point
//!
//! Runs one scan or one full trading cycle against the paper venue.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pairs_trader::config::Config;
use pairs_trader::data::{CsvPriceProvider, PriceSeriesProvider};
use pairs_trader::strategy::{CycleReport, ExecutionRecord, LegStatus, TradingCycle};
use pairs_trader::utils::decimal::decimal_from_f64;
use pairs_trader::venue::PaperVenue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Pairs Trader CLI
#[derive(Parser)]
#[command(name = "pairs-trader")]
#[command(version, about = "Cointegration pairs trading")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the universe for cointegrated pairs and print entry signals
    Scan {
        /// Path to CSV price file (defaults to universe.data_path)
        #[arg(short, long)]
        data: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one scan-and-execute cycle against the paper venue
    Run {
        /// Path to CSV price file (defaults to universe.data_path)
        #[arg(short, long)]
        data: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;
    log_config(&config);

    match cli.command {
        Commands::Scan { data, json } => run_scan(&config, data.as_deref(), json).await,
        Commands::Run { data, json } => run_cycle(&config, data.as_deref(), json).await,
    }
}

/// Initialize stdout and hourly-rolling file logging.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "pairs-trader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pairs_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    if config.universe.instruments.is_empty() {
        info!("   Universe: all instruments in data file");
    } else {
        info!("   Universe: {}", config.universe.instruments.join(", "));
    }
    info!("   Bars per instrument: {}", config.universe.bar_count);
    info!(
        "   Min aligned samples: {}, significance: {}",
        config.scanner.min_aligned_samples, config.scanner.significance
    );
    info!(
        "   Entry band: {} <= |z| < {}",
        config.signal.entry_z, config.signal.regime_break_z
    );
    info!(
        "   Base lot: {}, leg delay: {}ms, policy: {:?}",
        config.execution.base_lot, config.execution.leg_delay_ms, config.execution.leg_failure_policy
    );
}

fn data_path<'a>(config: &'a Config, data: Option<&'a str>) -> Result<&'a str> {
    data.or(config.universe.data_path.as_deref())
        .context("No price data given: pass --data or set universe.data_path")
}

async fn run_scan(config: &Config, data: Option<&str>, json: bool) -> Result<()> {
    let path = data_path(config, data)?;
    info!("📊 Loading prices from: {}", path);
    let provider = Arc::new(CsvPriceProvider::new(path)?);

    let report = TradingCycle::new(config, provider).evaluate().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_scan(&report);
    }
    Ok(())
}

async fn run_cycle(config: &Config, data: Option<&str>, json: bool) -> Result<()> {
    let path = data_path(config, data)?;
    info!("📊 Loading prices from: {}", path);
    let provider = Arc::new(CsvPriceProvider::new(path)?);

    let venue = Arc::new(PaperVenue::new(
        config.paper.spread_bps,
        Some(config.paper.volume_constraint()),
    ));
    venue.set_mids(last_closes(provider.as_ref(), config).await?).await;

    info!("📝 PAPER VENUE - no real orders are sent");
    let report = TradingCycle::new(config, provider).run(venue).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_scan(&report);
        for record in &report.executions {
            print_execution(record);
        }
        for aborted in &report.aborted {
            println!("ABORTED {}/{}: {}", aborted.sym1, aborted.sym2, aborted.reason);
        }
    }
    Ok(())
}

/// Last close of every configured instrument, used as the paper mid price.
async fn last_closes(
    provider: &CsvPriceProvider,
    config: &Config,
) -> Result<HashMap<String, rust_decimal::Decimal>> {
    let fetch = provider
        .fetch(&config.universe.instruments, config.universe.bar_count)
        .await?;

    let mut mids = HashMap::new();
    for (instrument, series) in &fetch.series {
        match series.last_close().and_then(decimal_from_f64) {
            Some(mid) => {
                mids.insert(instrument.clone(), mid);
            }
            None => warn!(%instrument, "No usable last close for paper quote"),
        }
    }
    Ok(mids)
}

fn print_scan(report: &CycleReport) {
    println!(
        "\nPairs tested: {}, accepted: {}, rejected: {}",
        report.scan.pairs_tested,
        report.scan.accepted.len(),
        report.scan.rejected.len()
    );
    if !report.unresolved.is_empty() {
        println!("No price data: {}", report.unresolved.join(", "));
    }

    for pair in &report.scan.accepted {
        println!(
            "  {:<10} {:<10} p={:.4} hedge={:.4} z={:.2}",
            pair.sym1,
            pair.sym2,
            pair.p_value,
            pair.hedge_ratio,
            pair.current_zscore().unwrap_or(f64::NAN)
        );
    }

    println!("\nSignals: {}", report.signals.len());
    for signal in &report.signals {
        println!(
            "  {}/{} {}",
            signal.pair.sym1, signal.pair.sym2, signal.direction
        );
    }
}

fn print_execution(record: &ExecutionRecord) {
    let status = |s: &LegStatus| match s {
        LegStatus::Sent => "filled".to_string(),
        LegStatus::Rejected { code } => format!("rejected ({})", code),
        LegStatus::Failed { reason } => format!("failed ({})", reason),
        LegStatus::NotSent => "not sent".to_string(),
    };

    println!(
        "\n{}/{} {} -> {:?}",
        record.sym1, record.sym2, record.direction, record.outcome
    );
    for leg in [&record.leg1, &record.leg2] {
        println!(
            "  {} {} {} @ {} : {}",
            leg.side,
            leg.normalized_volume,
            leg.instrument,
            leg.reference_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            status(&leg.status)
        );
    }
    if let Some(unwind) = &record.compensation {
        println!(
            "  unwind {} {} {} : {}",
            unwind.side,
            unwind.normalized_volume,
            unwind.instrument,
            status(&unwind.status)
        );
    }
    println!(
        "  entry spread {:.4}, take profit {:.4}, stop loss {:.4}",
        record.targets.entry_spread, record.targets.take_profit, record.targets.stop_loss
    );
}
