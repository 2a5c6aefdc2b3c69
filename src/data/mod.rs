//! Closing-price series and the providers that supply them.
//!
//! The scanner never talks to a data source directly; it receives a
//! [`PriceFetch`] from a [`PriceSeriesProvider`], which names every requested
//! instrument it could not resolve.

pub mod csv;

pub use self::csv::CsvPriceProvider;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Ordered timestamp -> close sequence for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSeries {
    pub instrument: String,
    pub closes: BTreeMap<DateTime<Utc>, f64>,
}

impl InstrumentSeries {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            closes: BTreeMap::new(),
        }
    }

    /// Build a series from `(timestamp, close)` points. Later duplicates win.
    pub fn from_points<I>(instrument: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64)>,
    {
        Self {
            instrument: instrument.into(),
            closes: points.into_iter().collect(),
        }
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, close: f64) {
        self.closes.insert(timestamp, close);
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.values().next_back().copied()
    }

    /// Keep only the most recent `bar_count` bars.
    pub fn truncate_to_last(&mut self, bar_count: usize) {
        while self.closes.len() > bar_count {
            self.closes.pop_first();
        }
    }

    /// Inner join on shared timestamps.
    ///
    /// Rows where either side is missing or not finite are dropped. Returns
    /// `(self_closes, other_closes)` in timestamp order.
    pub fn align_with(&self, other: &InstrumentSeries) -> (Vec<f64>, Vec<f64>) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (ts, a) in &self.closes {
            let Some(b) = other.closes.get(ts) else {
                continue;
            };
            if a.is_finite() && b.is_finite() {
                left.push(*a);
                right.push(*b);
            }
        }
        (left, right)
    }
}

/// Result of a provider request.
#[derive(Debug, Clone, Default)]
pub struct PriceFetch {
    pub series: HashMap<String, InstrumentSeries>,
    /// Requested instruments the provider had no data for
    pub unresolved: Vec<String>,
}

impl PriceFetch {
    pub fn get(&self, instrument: &str) -> Option<&InstrumentSeries> {
        self.series.get(instrument)
    }

    /// Resolved instruments in sorted order.
    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Source of historical closing prices.
#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    /// Fetch up to `bar_count` most recent closes for each instrument.
    ///
    /// An empty `instruments` slice requests everything the provider holds.
    async fn fetch(&self, instruments: &[String], bar_count: usize) -> Result<PriceFetch>;
}

/// Provider over series already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceProvider {
    series: HashMap<String, InstrumentSeries>,
}

impl InMemoryPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: InstrumentSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn insert(&mut self, series: InstrumentSeries) {
        self.series.insert(series.instrument.clone(), series);
    }
}

/// Shared selection logic for providers that hold all series in memory.
pub(crate) fn select_series(
    available: &HashMap<String, InstrumentSeries>,
    instruments: &[String],
    bar_count: usize,
) -> PriceFetch {
    let requested: Vec<String> = if instruments.is_empty() {
        let mut all: Vec<String> = available.keys().cloned().collect();
        all.sort();
        all
    } else {
        instruments.to_vec()
    };

    let mut fetch = PriceFetch::default();
    for name in requested {
        match available.get(&name) {
            Some(series) if !series.is_empty() => {
                let mut series = series.clone();
                series.truncate_to_last(bar_count);
                fetch.series.insert(name, series);
            }
            _ => {
                if !fetch.unresolved.contains(&name) {
                    fetch.unresolved.push(name);
                }
            }
        }
    }
    fetch
}

#[async_trait]
impl PriceSeriesProvider for InMemoryPriceProvider {
    async fn fetch(&self, instruments: &[String], bar_count: usize) -> Result<PriceFetch> {
        Ok(select_series(&self.series, instruments, bar_count))
    }
}
