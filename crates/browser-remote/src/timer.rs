//! Timeout sources for the response race.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;

/// Starts one-shot timers.
pub trait Timer: Send + Sync {
    /// A future that completes once `duration` has elapsed.
    fn start(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock timer backed by the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn start(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Timer that only fires when told to.
///
/// Every timer started from the same `ManualTimer` fires on [`ManualTimer::fire`],
/// whether it was started before or after the call.
pub struct ManualTimer {
    fired: watch::Sender<bool>,
    started: Mutex<Vec<Duration>>,
}

impl ManualTimer {
    pub fn new() -> Arc<Self> {
        let (fired, _) = watch::channel(false);
        Arc::new(Self {
            fired,
            started: Mutex::new(Vec::new()),
        })
    }

    pub fn fire(&self) {
        self.fired.send_replace(true);
    }

    /// Durations requested so far, in call order.
    pub fn started(&self) -> Vec<Duration> {
        match self.started.lock() {
            Ok(started) => started.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Timer for ManualTimer {
    fn start(&self, duration: Duration) -> BoxFuture<'static, ()> {
        match self.started.lock() {
            Ok(mut started) => started.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }

        let mut fired = self.fired.subscribe();
        Box::pin(async move {
            while !*fired.borrow_and_update() {
                if fired.changed().await.is_err() {
                    // Owner gone without firing: never fires.
                    std::future::pending::<()>().await;
                }
            }
        })
    }
}

/// Per-request timer override, read from the HTTP request's extensions.
#[derive(Clone)]
pub struct RequestTimer(pub Arc<dyn Timer>);

impl std::fmt::Debug for RequestTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestTimer")
    }
}
