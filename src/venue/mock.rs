//! In-memory paper venue for dry runs and tests.

use super::traits::{ExecutionVenue, VenueError};
use super::types::{OrderRequest, OrderSide, Quote, SendResult, VolumeConstraint};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Scripted outcome for the next order on an instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    Fill,
    Reject(i32),
    Fail(String),
}

/// Simulated account state.
#[derive(Debug, Default)]
pub struct PaperState {
    /// Every request received, in arrival order
    pub orders: Vec<OrderRequest>,
    /// Signed filled volume per instrument (buys positive)
    pub net_volume: HashMap<String, Decimal>,
    /// Orders that filled
    pub fills: u64,
    /// Orders refused with a venue code; transport failures count as neither
    pub rejections: u64,
}

/// Venue that fills market orders at the quoted price.
///
/// Instruments are known once a mid price is set. Constraints fall back to the
/// default constraint when none was set for the instrument.
pub struct PaperVenue {
    state: Arc<RwLock<PaperState>>,
    mids: Arc<RwLock<HashMap<String, Decimal>>>,
    constraints: Arc<RwLock<HashMap<String, VolumeConstraint>>>,
    scripts: Arc<RwLock<HashMap<String, VecDeque<ScriptedResponse>>>>,
    default_constraint: Option<VolumeConstraint>,
    /// Full bid/ask spread in basis points of mid
    spread_bps: Decimal,
    order_id_counter: AtomicU64,
    connected: AtomicBool,
    connects: AtomicU64,
    shutdowns: AtomicU64,
}

impl PaperVenue {
    pub fn new(spread_bps: Decimal, default_constraint: Option<VolumeConstraint>) -> Self {
        Self {
            state: Arc::new(RwLock::new(PaperState::default())),
            mids: Arc::new(RwLock::new(HashMap::new())),
            constraints: Arc::new(RwLock::new(HashMap::new())),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            default_constraint,
            spread_bps,
            order_id_counter: AtomicU64::new(1),
            connected: AtomicBool::new(false),
            connects: AtomicU64::new(0),
            shutdowns: AtomicU64::new(0),
        }
    }

    /// Set mid prices, e.g. the last close of every scanned instrument.
    pub async fn set_mids(&self, mids: HashMap<String, Decimal>) {
        self.mids.write().await.extend(mids);
    }

    pub async fn set_constraint(&self, instrument: &str, constraint: VolumeConstraint) {
        self.constraints
            .write()
            .await
            .insert(instrument.to_string(), constraint);
    }

    /// Queue responses for the next orders on `instrument`.
    pub async fn script(&self, instrument: &str, responses: Vec<ScriptedResponse>) {
        self.scripts
            .write()
            .await
            .entry(instrument.to_string())
            .or_default()
            .extend(responses);
    }

    /// Requests received so far.
    pub async fn orders(&self) -> Vec<OrderRequest> {
        self.state.read().await.orders.clone()
    }

    pub async fn net_volume(&self, instrument: &str) -> Decimal {
        self.state
            .read()
            .await
            .net_volume
            .get(instrument)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// `(fills, rejections)` seen so far.
    pub async fn fill_counts(&self) -> (u64, u64) {
        let state = self.state.read().await;
        (state.fills, state.rejections)
    }

    /// `(connects, shutdowns)` seen so far.
    pub fn connection_counts(&self) -> (u64, u64) {
        (
            self.connects.load(Ordering::SeqCst),
            self.shutdowns.load(Ordering::SeqCst),
        )
    }

    fn next_order_id(&self) -> u64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), VenueError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(VenueError::Disconnected)
        }
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    async fn connect(&self) -> Result<(), VenueError> {
        self.connected.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!("Paper venue connected");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), VenueError> {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        debug!("Paper venue shut down");
        Ok(())
    }

    async fn query_volume_constraint(
        &self,
        instrument: &str,
    ) -> Result<VolumeConstraint, VenueError> {
        self.ensure_connected()?;
        if let Some(c) = self.constraints.read().await.get(instrument) {
            return Ok(*c);
        }
        if self.mids.read().await.contains_key(instrument) {
            if let Some(c) = self.default_constraint {
                return Ok(c);
            }
        }
        Err(VenueError::NotFound(instrument.to_string()))
    }

    async fn quote(&self, instrument: &str) -> Result<Quote, VenueError> {
        self.ensure_connected()?;
        let mid = self
            .mids
            .read()
            .await
            .get(instrument)
            .copied()
            .ok_or_else(|| VenueError::Unavailable(instrument.to_string()))?;
        let half = mid * self.spread_bps / dec!(20000);
        Ok(Quote {
            bid: mid - half,
            ask: mid + half,
        })
    }

    async fn send(&self, request: &OrderRequest) -> Result<SendResult, VenueError> {
        self.ensure_connected()?;

        let scripted = self
            .scripts
            .write()
            .await
            .get_mut(&request.instrument)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(ScriptedResponse::Fill);

        let mut state = self.state.write().await;
        state.orders.push(request.clone());

        match scripted {
            ScriptedResponse::Fill => {
                let signed = match request.side {
                    OrderSide::Buy => request.volume,
                    OrderSide::Sell => -request.volume,
                };
                *state
                    .net_volume
                    .entry(request.instrument.clone())
                    .or_insert(Decimal::ZERO) += signed;
                state.fills += 1;

                let order_id = self.next_order_id();
                info!(
                    order_id,
                    instrument = %request.instrument,
                    side = %request.side,
                    volume = %request.volume,
                    price = %request.reference_price,
                    tag = request.strategy_tag,
                    "Paper order filled"
                );
                Ok(SendResult::Filled {
                    order_id,
                    fill_price: request.reference_price,
                })
            }
            ScriptedResponse::Reject(code) => {
                state.rejections += 1;
                warn!(instrument = %request.instrument, code, "Paper order rejected");
                Ok(SendResult::Rejected { code })
            }
            ScriptedResponse::Fail(reason) => Err(VenueError::Transport(reason)),
        }
    }
}
