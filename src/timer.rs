//! Timeout race for handler invocations.
//!
//! [`Timer::race`] spawns the handler future onto the tokio runtime and races
//! it against a sleep. The first to finish wins. When the sleep wins the
//! handler task is **detached, not cancelled**: it keeps running in the
//! background and any side effects it has started may still complete after
//! the timeout response has been sent. Handlers that must not outlive their
//! request should check their own deadlines.
//!
//! On the success path the sleep is dropped with the `select!`, so no timer
//! outlives the race.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RaceError {
    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    after: Duration,
}

impl Timer {
    pub fn new(after: Duration) -> Self {
        Self { after }
    }

    pub fn after(&self) -> Duration {
        self.after
    }

    /// Race `fut` against the timer. Must be called within a tokio runtime.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, RaceError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = tokio::spawn(fut);
        let sleep = tokio::time::sleep(self.after);
        tokio::pin!(sleep);

        tokio::select! {
            // a handler that is ready together with the timer still wins
            biased;
            joined = &mut task => joined.map_err(from_join_error),
            () = &mut sleep => {
                warn!(timeout_ms = self.after.as_millis() as u64, "Handler timed out; task detached");
                Err(RaceError::TimedOut(self.after))
            }
        }
    }
}

/// Run `fut` to completion without a timer, turning a panic into an error.
pub async fn guarded<F, T>(fut: F) -> Result<T, RaceError>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| RaceError::Panicked(panic_message(payload.as_ref())))
}

fn from_join_error(err: JoinError) -> RaceError {
    if err.is_panic() {
        RaceError::Panicked(panic_message(err.into_panic().as_ref()))
    } else {
        RaceError::Panicked("handler task was cancelled".to_string())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
