//! Isolation boundary around plugin entry-point calls.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, warn};

/// Identifies an entry-point call in logs.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub plugin: &'a str,
    pub role: &'a str,
    pub symbol: &'a str,
}

impl<'a> CallSite<'a> {
    pub fn new(plugin: &'a str, role: &'a str, symbol: &'a str) -> Self {
        Self {
            plugin,
            role,
            symbol,
        }
    }
}

impl fmt::Display for CallSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} ({})", self.plugin, self.symbol, self.role)
    }
}

/// How a guarded call ended.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Completed(T),
    /// The call panicked; carries the panic message.
    Panicked(String),
    /// The call did not finish within the configured timeout and was
    /// abandoned.
    TimedOut(Duration),
}

impl<T> CallOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Runs entry points so that a panic or a hang stays local to one call.
///
/// Panics are caught both in the synchronous part of the call and while the
/// returned future is polled. With a timeout set, async calls that take
/// longer are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallGuard {
    timeout: Option<Duration>,
}

impl CallGuard {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs an async entry point.
    pub async fn run<F, Fut, T>(&self, site: CallSite<'_>, f: F) -> CallOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let call = AssertUnwindSafe(async move { f().await }).catch_unwind();

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        plugin = %site.plugin,
                        role = %site.role,
                        symbol = %site.symbol,
                        timeout_ms = limit.as_millis() as u64,
                        "Entry point timed out, call abandoned"
                    );
                    return CallOutcome::TimedOut(limit);
                }
            },
            None => call.await,
        };

        settle(site, result)
    }

    /// Runs a synchronous entry point. Timeouts do not apply.
    pub fn run_sync<F, T>(&self, site: CallSite<'_>, f: F) -> CallOutcome<T>
    where
        F: FnOnce() -> T,
    {
        settle(site, panic::catch_unwind(AssertUnwindSafe(f)))
    }
}

fn settle<T>(site: CallSite<'_>, result: Result<T, Box<dyn Any + Send>>) -> CallOutcome<T> {
    match result {
        Ok(value) => CallOutcome::Completed(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                plugin = %site.plugin,
                role = %site.role,
                symbol = %site.symbol,
                panic = %message,
                "Entry point panicked"
            );
            CallOutcome::Panicked(message)
        }
    }
}

/// Extracts a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
