//! Venue-agnostic execution interface.
//!
//! Anything that can quote, report volume limits and accept market orders can
//! sit behind [`ExecutionVenue`]: a broker terminal bridge, an exchange
//! gateway or the in-memory [`PaperVenue`](super::PaperVenue).

use super::types::{OrderRequest, Quote, SendResult, VolumeConstraint};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to a venue.
///
/// An order the venue explicitly refused is not an error; it comes back as
/// [`SendResult::Rejected`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VenueError {
    #[error("instrument not found: {0}")]
    NotFound(String),

    #[error("no quote available for {0}")]
    Unavailable(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("venue session is not connected")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(String),
}

impl VenueError {
    /// Whether the session may repeat the call.
    ///
    /// A transport error on `send` can arrive after the venue accepted the
    /// order, so repeating a send may fill it twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VenueError::Transport(_))
    }
}

/// An execution venue the coordinator can trade through.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Establish the connection used by every other call.
    async fn connect(&self) -> Result<(), VenueError>;

    /// Release the connection.
    async fn shutdown(&self) -> Result<(), VenueError>;

    /// Current volume limits for `instrument`. Never cached by callers.
    async fn query_volume_constraint(&self, instrument: &str)
        -> Result<VolumeConstraint, VenueError>;

    /// Current best bid/ask for `instrument`.
    async fn quote(&self, instrument: &str) -> Result<Quote, VenueError>;

    /// Submit one order.
    async fn send(&self, request: &OrderRequest) -> Result<SendResult, VenueError>;
}
