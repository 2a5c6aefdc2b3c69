//! Two-leg spread order execution.
//!
//! The venue has no atomic multi-leg order, so legs are sent one after the
//! other with a settling delay between them. What happens to leg 2 when leg 1
//! does not fill is governed by [`LegFailurePolicy`]; a filled leg whose
//! partner failed can be unwound with an opposite-side order.

use super::normalizer::VolumeNormalizer;
use super::signal::{Signal, SpreadDirection};
use crate::config::ExecutionConfig;
use crate::utils::decimal::decimal_from_f64;
use crate::venue::{OrderRequest, OrderSide, SendResult, VenueSession};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Comment attached to compensating orders.
const UNWIND_COMMENT: &str = "Spread Unwind";

/// Identifies one side of the paired order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegId {
    First,
    Second,
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegId::First => write!(f, "leg1"),
            LegId::Second => write!(f, "leg2"),
        }
    }
}

/// What to do with leg 2 when leg 1 did not fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegFailurePolicy {
    /// Leg 2 is only sent after leg 1 filled
    AbortSecondLeg,
    /// Leg 2 is sent whatever leg 1 returned
    SendRegardless,
}

/// Errors from spread execution.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("volume constraint unavailable for {instrument}: {reason}")]
    ConstraintUnavailable { instrument: String, reason: String },

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("{leg} send failed{}", code_suffix(.code))]
    LegSendFailure { leg: LegId, code: Option<i32> },

    #[error("partial execution: {leg} did not fill, position is unhedged")]
    PartialExecution { leg: LegId },
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" with code {}", c)).unwrap_or_default()
}

/// Final state of one order leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LegStatus {
    /// Venue reported the order filled
    Sent,
    Rejected { code: i32 },
    /// Transport error, timeout, missing quote or invalid request
    Failed { reason: String },
    /// Suppressed by the leg failure policy
    NotSent,
}

impl LegStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, LegStatus::Sent)
    }

    fn code(&self) -> Option<i32> {
        match self {
            LegStatus::Rejected { code } => Some(*code),
            _ => None,
        }
    }
}

/// One order of the pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLeg {
    pub instrument: String,
    pub side: OrderSide,
    pub requested_volume: Decimal,
    pub normalized_volume: Decimal,
    /// Quote price the order was sent at; `None` if no quote was taken
    pub reference_price: Option<Decimal>,
    pub status: LegStatus,
    pub order_id: Option<u64>,
}

/// Outcome of a paired execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionOutcome {
    BothFilled,
    /// The named leg failed while the other filled
    PartialFailure(LegId),
    BothFailed,
}

/// Spread levels recorded at entry. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpreadTargets {
    pub entry_spread: f64,
    /// Spread mean
    pub take_profit: f64,
    pub stop_loss: f64,
}

/// Everything that happened while executing one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub sym1: String,
    pub sym2: String,
    pub direction: SpreadDirection,
    pub hedge_ratio: f64,
    pub leg1: OrderLeg,
    pub leg2: OrderLeg,
    pub outcome: ExecutionOutcome,
    pub targets: SpreadTargets,
    /// Opposite-side order sent to flatten the filled leg of a partial failure
    pub compensation: Option<OrderLeg>,
}

impl ExecutionRecord {
    /// True only when both legs filled.
    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::BothFilled
    }

    /// The failure this record represents, if any.
    pub fn error(&self) -> Option<ExecutionError> {
        match self.outcome {
            ExecutionOutcome::BothFilled => None,
            ExecutionOutcome::PartialFailure(leg) => Some(ExecutionError::PartialExecution { leg }),
            ExecutionOutcome::BothFailed => Some(ExecutionError::LegSendFailure {
                leg: LegId::First,
                code: self.leg1.status.code(),
            }),
        }
    }

    /// Fail when one leg filled without its hedge.
    pub fn ensure_hedged(&self) -> Result<(), ExecutionError> {
        match self.error() {
            Some(e @ ExecutionError::PartialExecution { .. }) => Err(e),
            _ => Ok(()),
        }
    }
}

/// Sizes, normalizes and sends the two legs of a spread signal.
pub struct ExecutionCoordinator {
    config: ExecutionConfig,
    normalizer: VolumeNormalizer,
}

struct PlannedLeg {
    instrument: String,
    side: OrderSide,
    requested_volume: Decimal,
    normalized_volume: Decimal,
}

impl ExecutionCoordinator {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            normalizer: VolumeNormalizer::new(),
        }
    }

    /// Execute one signal through `session`.
    ///
    /// `Err` means the signal was aborted before anything was sent. Once a
    /// leg has been sent the result is always an [`ExecutionRecord`], which
    /// may describe a partial failure.
    #[instrument(skip(self, session, signal), fields(sym1 = %signal.pair.sym1, sym2 = %signal.pair.sym2, direction = %signal.direction))]
    pub async fn execute(
        &self,
        session: &VenueSession,
        signal: &Signal,
    ) -> Result<ExecutionRecord, ExecutionError> {
        let pair = &signal.pair;
        let hedge = decimal_from_f64(pair.hedge_ratio.abs()).ok_or_else(|| {
            ExecutionError::InvalidOrder(format!("hedge ratio {} is not finite", pair.hedge_ratio))
        })?;

        let (side1, side2) = match signal.direction {
            SpreadDirection::LongSpread => (OrderSide::Buy, OrderSide::Sell),
            SpreadDirection::ShortSpread => (OrderSide::Sell, OrderSide::Buy),
        };

        // Both volumes must normalize before anything is sent.
        let plan1 = self
            .plan_leg(session, &pair.sym1, side1, self.config.base_lot)
            .await?;
        let plan2 = self
            .plan_leg(session, &pair.sym2, side2, hedge * self.config.base_lot)
            .await?;

        let targets = self.targets(signal);

        info!(
            leg1_volume = %plan1.normalized_volume,
            leg2_volume = %plan2.normalized_volume,
            hedge_ratio = pair.hedge_ratio,
            zscore = pair.current_zscore(),
            "Executing spread entry"
        );

        let leg1 = self
            .send_leg(session, plan1, &self.config.order_comment)
            .await;

        let leg2 = if !leg1.status.is_sent()
            && self.config.leg_failure_policy == LegFailurePolicy::AbortSecondLeg
        {
            warn!(
                instrument = %plan2.instrument,
                leg1_status = ?leg1.status,
                "Leg 1 did not fill, leg 2 not sent"
            );
            Self::unsent(plan2)
        } else {
            tokio::time::sleep(Duration::from_millis(self.config.leg_delay_ms)).await;
            self.send_leg(session, plan2, &self.config.order_comment)
                .await
        };

        let outcome = match (leg1.status.is_sent(), leg2.status.is_sent()) {
            (true, true) => ExecutionOutcome::BothFilled,
            (true, false) => ExecutionOutcome::PartialFailure(LegId::Second),
            (false, true) => ExecutionOutcome::PartialFailure(LegId::First),
            (false, false) => ExecutionOutcome::BothFailed,
        };

        let compensation = match outcome {
            ExecutionOutcome::PartialFailure(failed) => {
                let filled = if failed == LegId::Second { &leg1 } else { &leg2 };
                error!(
                    failed_leg = %failed,
                    unhedged_instrument = %filled.instrument,
                    unhedged_side = %filled.side,
                    unhedged_volume = %filled.normalized_volume,
                    "Partial execution, position is unhedged"
                );
                if self.config.unwind_on_second_leg_failure {
                    Some(self.unwind(session, filled).await)
                } else {
                    None
                }
            }
            ExecutionOutcome::BothFailed => {
                error!("Both legs failed, no position opened");
                None
            }
            ExecutionOutcome::BothFilled => {
                info!(
                    entry_spread = targets.entry_spread,
                    take_profit = targets.take_profit,
                    stop_loss = targets.stop_loss,
                    "Spread entry filled"
                );
                None
            }
        };

        Ok(ExecutionRecord {
            sym1: pair.sym1.clone(),
            sym2: pair.sym2.clone(),
            direction: signal.direction,
            hedge_ratio: pair.hedge_ratio,
            leg1,
            leg2,
            outcome,
            targets,
            compensation,
        })
    }

    /// Take-profit at the spread mean, stop-loss `stop_loss_sigma` deviations
    /// beyond the entry spread on the adverse side.
    fn targets(&self, signal: &Signal) -> SpreadTargets {
        let pair = &signal.pair;
        let entry_spread = pair.current_spread().unwrap_or(pair.mean);
        SpreadTargets {
            entry_spread,
            take_profit: pair.mean,
            stop_loss: entry_spread
                + signal.direction.sign() * self.config.stop_loss_sigma * pair.std,
        }
    }

    async fn plan_leg(
        &self,
        session: &VenueSession,
        instrument: &str,
        side: OrderSide,
        requested_volume: Decimal,
    ) -> Result<PlannedLeg, ExecutionError> {
        let constraint = session.volume_constraint(instrument).await.map_err(|e| {
            ExecutionError::ConstraintUnavailable {
                instrument: instrument.to_string(),
                reason: e.to_string(),
            }
        })?;

        let normalized_volume = self
            .normalizer
            .normalize(instrument, requested_volume, &constraint)
            .map_err(|e| ExecutionError::ConstraintUnavailable {
                instrument: e.instrument,
                reason: e.reason,
            })?;

        Ok(PlannedLeg {
            instrument: instrument.to_string(),
            side,
            requested_volume,
            normalized_volume,
        })
    }

    fn unsent(plan: PlannedLeg) -> OrderLeg {
        OrderLeg {
            instrument: plan.instrument,
            side: plan.side,
            requested_volume: plan.requested_volume,
            normalized_volume: plan.normalized_volume,
            reference_price: None,
            status: LegStatus::NotSent,
            order_id: None,
        }
    }

    /// Quote, build and send one market order.
    async fn send_leg(&self, session: &VenueSession, plan: PlannedLeg, comment: &str) -> OrderLeg {
        let mut leg = Self::unsent(plan);

        let quote = match session.quote(&leg.instrument).await {
            Ok(q) => q,
            Err(e) => {
                error!(instrument = %leg.instrument, error = %e, "No quote, order not sent");
                leg.status = LegStatus::Failed {
                    reason: e.to_string(),
                };
                return leg;
            }
        };
        let price = quote.price_for(leg.side);
        leg.reference_price = Some(price);

        let request = OrderRequest {
            instrument: leg.instrument.clone(),
            side: leg.side,
            volume: leg.normalized_volume,
            reference_price: price,
            time_in_force: self.config.time_in_force,
            fill_policy: self.config.fill_policy,
            strategy_tag: self.config.strategy_tag,
            comment: comment.to_string(),
            max_deviation_points: self.config.max_deviation_points,
        };
        if let Err(e) = request.validate() {
            error!(instrument = %leg.instrument, error = %e, "Invalid order request");
            leg.status = LegStatus::Failed {
                reason: format!("{:#}", e),
            };
            return leg;
        }

        match session.send(&request).await {
            Ok(SendResult::Filled {
                order_id,
                fill_price,
            }) => {
                info!(
                    instrument = %leg.instrument,
                    side = %leg.side,
                    volume = %leg.normalized_volume,
                    %price,
                    %fill_price,
                    order_id,
                    "Order filled"
                );
                leg.status = LegStatus::Sent;
                leg.order_id = Some(order_id);
            }
            Ok(SendResult::Rejected { code }) => {
                error!(instrument = %leg.instrument, side = %leg.side, code, "Order rejected");
                leg.status = LegStatus::Rejected { code };
            }
            Err(e) => {
                error!(instrument = %leg.instrument, side = %leg.side, error = %e, "Order send failed");
                leg.status = LegStatus::Failed {
                    reason: e.to_string(),
                };
            }
        }
        leg
    }

    /// Send an opposite-side order for a filled leg's volume.
    async fn unwind(&self, session: &VenueSession, filled: &OrderLeg) -> OrderLeg {
        warn!(
            instrument = %filled.instrument,
            volume = %filled.normalized_volume,
            "Unwinding filled leg"
        );
        let plan = PlannedLeg {
            instrument: filled.instrument.clone(),
            side: filled.side.opposite(),
            requested_volume: filled.normalized_volume,
            normalized_volume: filled.normalized_volume,
        };
        let leg = self.send_leg(session, plan, UNWIND_COMMENT).await;
        if !leg.status.is_sent() {
            error!(
                instrument = %leg.instrument,
                status = ?leg.status,
                "CRITICAL: failed to unwind filled leg"
            );
        }
        leg
    }
}
