//! CSV-backed price provider.

use super::{select_series, InstrumentSeries, PriceFetch, PriceSeriesProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Closing prices loaded from a CSV file.
///
/// Expected CSV format:
/// ```csv
/// timestamp,symbol,close
/// 2024-01-01T00:00:00Z,EURUSD,1.1042
/// 1704153600,GBPUSD,1.2731
/// ```
/// Timestamps are RFC 3339 or unix seconds.
#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    series: HashMap<String, InstrumentSeries>,
}

impl CsvPriceProvider {
    /// Load closes from a CSV file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

        let provider = Self::from_csv_content(&content)?;
        debug!(
            path = %path.display(),
            instruments = provider.series.len(),
            "Loaded price CSV"
        );
        Ok(provider)
    }

    /// Parse closes from CSV content.
    pub fn from_csv_content(content: &str) -> Result<Self> {
        let mut series: HashMap<String, InstrumentSeries> = HashMap::new();
        let mut rows = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            if line_num == 0 && line.starts_with("timestamp") {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            let row = CsvRow::parse(line)
                .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))?;
            series
                .entry(row.symbol.clone())
                .or_insert_with(|| InstrumentSeries::new(row.symbol.clone()))
                .push(row.timestamp, row.close);
            rows += 1;
        }

        if rows == 0 {
            anyhow::bail!("CSV file contains no data rows");
        }

        Ok(Self { series })
    }

    /// All instruments in the file, sorted.
    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl PriceSeriesProvider for CsvPriceProvider {
    async fn fetch(&self, instruments: &[String], bar_count: usize) -> Result<PriceFetch> {
        Ok(select_series(&self.series, instruments, bar_count))
    }
}

#[derive(Debug)]
struct CsvRow {
    timestamp: DateTime<Utc>,
    symbol: String,
    close: f64,
}

impl CsvRow {
    fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 3 {
            anyhow::bail!(
                "Expected 3 columns (timestamp,symbol,close), got {}",
                parts.len()
            );
        }

        let symbol = parts[1].trim();
        if symbol.is_empty() {
            anyhow::bail!("Empty symbol");
        }

        Ok(Self {
            timestamp: parse_timestamp(parts[0].trim())?,
            symbol: symbol.to_string(),
            close: parts[2]
                .trim()
                .parse()
                .with_context(|| format!("Invalid close: {}", parts[2]))?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .with_context(|| format!("Unix timestamp out of range: {}", raw));
    }
    raw.parse::<DateTime<Utc>>()
        .with_context(|| format!("Invalid timestamp: {}", raw))
}
