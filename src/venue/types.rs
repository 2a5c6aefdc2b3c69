//! Order, quote and constraint types exchanged with an execution venue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// How long an order stays working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Gtc, // Good Till Cancel
    Day,
}

/// What happens to volume that cannot be matched immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    FillOrKill,
    ImmediateOrCancel,
    Return,
}

/// Best bid/ask for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    /// Price a market order on `side` executes against: ask for buys, bid for sells.
    pub fn price_for(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }
}

/// Tradable volume limits for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeConstraint {
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

impl VolumeConstraint {
    pub fn new(min: Decimal, max: Decimal, step: Decimal) -> Self {
        Self { min, max, step }
    }

    /// Describe why the constraint cannot be used, if it cannot.
    pub fn defect(&self) -> Option<String> {
        if self.step <= Decimal::ZERO {
            return Some(format!("non-positive volume step {}", self.step));
        }
        if self.min < Decimal::ZERO {
            return Some(format!("negative minimum volume {}", self.min));
        }
        if self.min > self.max {
            return Some(format!("minimum {} exceeds maximum {}", self.min, self.max));
        }
        None
    }
}

/// A fully specified market order sent to the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: OrderSide,
    pub volume: Decimal,
    pub reference_price: Decimal,
    pub time_in_force: TimeInForce,
    pub fill_policy: FillPolicy,
    /// Constant tag identifying orders placed by this strategy
    pub strategy_tag: u64,
    pub comment: String,
    /// Maximum accepted slippage from `reference_price`, in price points
    pub max_deviation_points: u32,
}

impl OrderRequest {
    /// Check every field before the request leaves the process.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.instrument.trim().is_empty(),
            "order instrument must not be empty"
        );
        anyhow::ensure!(
            self.volume > Decimal::ZERO,
            "order volume must be positive, got {}",
            self.volume
        );
        anyhow::ensure!(
            self.reference_price > Decimal::ZERO,
            "reference price must be positive, got {}",
            self.reference_price
        );
        Ok(())
    }
}

/// Venue response to a send that reached the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SendResult {
    Filled { order_id: u64, fill_price: Decimal },
    Rejected { code: i32 },
}

impl SendResult {
    pub fn is_filled(&self) -> bool {
        matches!(self, SendResult::Filled { .. })
    }
}
