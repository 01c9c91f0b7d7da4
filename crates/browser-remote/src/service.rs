//! RelayService: transport-agnostic request/response correlation.
//!
//! One call to [`RelayService::relay`] is one HTTP request's life:
//! register a response slot, send the query to the native peer, then race the
//! slot against the timeout. Transports (HTTP today) only render the outcome.

use std::sync::Arc;
use std::time::Duration;

use crate::bridge::protocol::{MessageFromNative, MessageToNative};
use crate::bridge::{BridgeError, NativeSender};
use crate::registry::{CorrelationRegistry, WaitOutcome};
use crate::timer::{Timer, TokioTimer};

/// How long a request waits for the native peer by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("native bridge unavailable: {0}")]
    Bridge(#[from] BridgeError),
}

/// A query to evaluate in the browser.
#[derive(Debug, Clone)]
pub struct RelayQuery {
    pub query: String,
    pub tabs: Option<String>,
}

#[derive(Debug)]
pub enum RelayOutcome {
    /// Native peer answered; fields are passed through untouched.
    Responded(MessageFromNative),
    TimedOut,
}

pub struct RelayService {
    registry: Arc<CorrelationRegistry>,
    sender: Arc<dyn NativeSender>,
    timer: Arc<dyn Timer>,
    timeout: Duration,
}

impl RelayService {
    pub fn new(registry: Arc<CorrelationRegistry>, sender: Arc<dyn NativeSender>) -> Self {
        Self {
            registry,
            sender,
            timer: Arc::new(TokioTimer),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the default timer for every request.
    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `query` to the native peer and wait for its answer.
    ///
    /// `timer` overrides the service timer for this request only.
    pub async fn relay(
        &self,
        query: RelayQuery,
        timer: Option<Arc<dyn Timer>>,
    ) -> Result<RelayOutcome, RelayError> {
        // Dropping `pending` forgets the id on every path out of here.
        let mut pending = self.registry.register_new();
        let id = pending.id();

        self.sender
            .send(MessageToNative::query(id, query.query, query.tabs))
            .await?;
        tracing::debug!(%id, "Query sent to native peer");

        let timer = timer.unwrap_or_else(|| Arc::clone(&self.timer));
        let deadline = timer.start(self.timeout);

        match pending.wait(deadline).await {
            WaitOutcome::Responded(message) => {
                tracing::debug!(%id, status = %message.status, "Native peer responded");
                Ok(RelayOutcome::Responded(message))
            }
            WaitOutcome::TimedOut => {
                tracing::error!(
                    %id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Timeout responding to request"
                );
                Ok(RelayOutcome::TimedOut)
            }
            WaitOutcome::Abandoned => {
                tracing::warn!(%id, "Response slot removed before an answer arrived");
                Ok(RelayOutcome::TimedOut)
            }
        }
    }
}
