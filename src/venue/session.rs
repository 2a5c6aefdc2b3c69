//! Scoped connection to an execution venue.
//!
//! A [`VenueSession`] is opened explicitly, handed to whoever needs the venue
//! and closed explicitly. Every call through it is subject to the configured
//! timeout and transport-retry budget.

use super::traits::{ExecutionVenue, VenueError};
use super::types::{OrderRequest, Quote, SendResult, VolumeConstraint};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout and retry knobs applied to every venue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Total attempts per call; 1 means no retry.
    /// Retrying `send` after a transport error can duplicate an order.
    pub max_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            max_attempts: 1,
        }
    }
}

/// An open connection to a venue.
pub struct VenueSession {
    venue: Arc<dyn ExecutionVenue>,
    settings: SessionSettings,
    open: AtomicBool,
}

impl VenueSession {
    /// Connect to `venue`.
    pub async fn open(
        venue: Arc<dyn ExecutionVenue>,
        settings: SessionSettings,
    ) -> Result<Self, VenueError> {
        let session = Self {
            venue,
            settings,
            open: AtomicBool::new(false),
        };
        let venue = Arc::clone(&session.venue);
        session.call("connect", || venue.connect()).await?;
        session.open.store(true, Ordering::SeqCst);
        info!(
            timeout_ms = settings.timeout.map(|t| t.as_millis() as u64),
            max_attempts = settings.max_attempts,
            "Venue session opened"
        );
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    /// Disconnect. Safe to call more than once; later calls are no-ops.
    pub async fn close(&self) -> Result<(), VenueError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let venue = Arc::clone(&self.venue);
        let result = self.call("shutdown", || venue.shutdown()).await;
        match &result {
            Ok(()) => info!("Venue session closed"),
            Err(e) => warn!(error = %e, "Venue shutdown reported an error"),
        }
        result
    }

    pub async fn volume_constraint(&self, instrument: &str) -> Result<VolumeConstraint, VenueError> {
        self.ensure_open()?;
        let venue = Arc::clone(&self.venue);
        self.call("query_volume_constraint", || {
            let venue = Arc::clone(&venue);
            let instrument = instrument.to_string();
            async move { venue.query_volume_constraint(&instrument).await }
        })
        .await
    }

    pub async fn quote(&self, instrument: &str) -> Result<Quote, VenueError> {
        self.ensure_open()?;
        let venue = Arc::clone(&self.venue);
        self.call("quote", || {
            let venue = Arc::clone(&venue);
            let instrument = instrument.to_string();
            async move { venue.quote(&instrument).await }
        })
        .await
    }

    pub async fn send(&self, request: &OrderRequest) -> Result<SendResult, VenueError> {
        self.ensure_open()?;
        let venue = Arc::clone(&self.venue);
        self.call("send", || {
            let venue = Arc::clone(&venue);
            let request = request.clone();
            async move { venue.send(&request).await }
        })
        .await
    }

    fn ensure_open(&self) -> Result<(), VenueError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(VenueError::Disconnected)
        }
    }

    /// Run one venue call under the timeout, retrying transport errors.
    async fn call<T, F, Fut>(&self, operation: &'static str, mut make: F) -> Result<T, VenueError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VenueError>>,
    {
        let attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match self.settings.timeout {
                Some(after) => match tokio::time::timeout(after, make()).await {
                    Ok(result) => result,
                    Err(_) => Err(VenueError::Timeout { operation, after }),
                },
                None => make().await,
            };

            match result {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    if operation == "send" {
                        warn!(attempt, error = %e, "Resending order after transport error, venue may hold a duplicate");
                    } else {
                        debug!(operation, attempt, error = %e, "Retrying venue call");
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl Drop for VenueSession {
    fn drop(&mut self) {
        if self.open.load(Ordering::SeqCst) {
            warn!("Venue session dropped without close()");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::traits::MockExecutionVenue;
    use crate::venue::types::{FillPolicy, OrderSide, TimeInForce};
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
            instrument: "EURUSD".to_string(),
            side: OrderSide::Buy,
            volume: dec!(0.1),
            reference_price: dec!(1.1),
            time_in_force: TimeInForce::Gtc,
            fill_policy: FillPolicy::FillOrKill,
            strategy_tag: 1,
            comment: String::new(),
            max_deviation_points: 20,
        }
    }

    fn connected_mock() -> MockExecutionVenue {
        let mut venue = MockExecutionVenue::new();
        venue.expect_connect().times(1).returning(|| Ok(()));
        venue.expect_shutdown().times(1).returning(|| Ok(()));
        venue
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test]
    async fn test_open_and_close() {
        let session = VenueSession::open(Arc::new(connected_mock()), SessionSettings::default())
            .await
            .unwrap();
        assert!(session.is_open());

        session.close().await.unwrap();
        assert!(!session.is_open());
        // Second close does not reach the venue again
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_calls_after_close_are_rejected() {
        let session = VenueSession::open(Arc::new(connected_mock()), SessionSettings::default())
            .await
            .unwrap();
        session.close().await.unwrap();

        let err = session.quote("EURUSD").await.unwrap_err();
        assert_eq!(err, VenueError::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connect_is_reported() {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_connect()
            .returning(|| Err(VenueError::Transport("refused".into())));

        let result = VenueSession::open(Arc::new(venue), SessionSettings::default()).await;
        assert!(matches!(result, Err(VenueError::Transport(_))));
    }

    // =========================================================================
    // Retry and timeout
    // =========================================================================

    #[tokio::test]
    async fn test_single_attempt_by_default() {
        let mut venue = connected_mock();
        venue
            .expect_send()
            .times(1)
            .returning(|_| Err(VenueError::Transport("reset".into())));

        let session = VenueSession::open(Arc::new(venue), SessionSettings::default())
            .await
            .unwrap();
        assert!(session.send(&request()).await.is_err());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let mut venue = connected_mock();
        let mut seq = mockall::Sequence::new();
        venue
            .expect_send()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(VenueError::Transport("reset".into())));
        venue
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(SendResult::Filled {
                    order_id: 7,
                    fill_price: dec!(1.1),
                })
            });

        let settings = SessionSettings {
            timeout: None,
            max_attempts: 3,
        };
        let session = VenueSession::open(Arc::new(venue), settings).await.unwrap();
        let result = session.send(&request()).await.unwrap();
        assert!(result.is_filled());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let mut venue = connected_mock();
        venue
            .expect_send()
            .times(1)
            .returning(|_| Ok(SendResult::Rejected { code: 10019 }));

        let settings = SessionSettings {
            timeout: None,
            max_attempts: 5,
        };
        let session = VenueSession::open(Arc::new(venue), settings).await.unwrap();
        let result = session.send(&request()).await.unwrap();
        assert_eq!(result, SendResult::Rejected { code: 10019 });
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_resent_order_reaches_venue_twice() {
        use crate::venue::{PaperVenue, ScriptedResponse};

        let venue = Arc::new(PaperVenue::new(dec!(2), None));
        venue
            .script("EURUSD", vec![ScriptedResponse::Fail("reset after accept".into())])
            .await;
        let settings = SessionSettings {
            timeout: None,
            max_attempts: 2,
        };
        let session = VenueSession::open(venue.clone(), settings).await.unwrap();

        assert!(session.send(&request()).await.unwrap().is_filled());
        // Both submissions were received; the venue cannot tell them apart.
        assert_eq!(venue.orders().await.len(), 2);
        session.close().await.unwrap();
    }

    struct SlowVenue;

    #[async_trait::async_trait]
    impl ExecutionVenue for SlowVenue {
        async fn connect(&self) -> Result<(), VenueError> {
            Ok(())
        }
        async fn shutdown(&self) -> Result<(), VenueError> {
            Ok(())
        }
        async fn query_volume_constraint(
            &self,
            instrument: &str,
        ) -> Result<VolumeConstraint, VenueError> {
            Err(VenueError::NotFound(instrument.to_string()))
        }
        async fn quote(&self, _instrument: &str) -> Result<Quote, VenueError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Quote {
                bid: dec!(1),
                ask: dec!(1),
            })
        }
        async fn send(&self, _request: &OrderRequest) -> Result<SendResult, VenueError> {
            Ok(SendResult::Rejected { code: 0 })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_enforced() {
        let settings = SessionSettings {
            timeout: Some(Duration::from_millis(500)),
            max_attempts: 1,
        };
        let session = VenueSession::open(Arc::new(SlowVenue), settings).await.unwrap();

        let err = session.quote("EURUSD").await.unwrap_err();
        assert_eq!(
            err,
            VenueError::Timeout {
                operation: "quote",
                after: Duration::from_millis(500)
            }
        );
        session.close().await.unwrap();
    }
}
