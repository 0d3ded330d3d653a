//! Wait conditions and settle strategies.
//!
//! Violation reports arrive asynchronously, after the engine has already
//! told us the document loaded. A scenario therefore waits for a settle
//! point before reading its signals: either a fixed delay, or (preferably)
//! a page expression the fixture makes truthy once its own work is done.

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Default timeout for wait operations (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default poll interval for checking conditions (100ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default settle delay after a document reports ready.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Configuration for wait operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Maximum time to wait for the condition.
    pub timeout: Duration,

    /// How often to check if the condition is satisfied.
    pub poll_interval: Duration,
}

impl WaitConfig {
    /// Creates a new wait configuration.
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Creates a config with custom timeout and default poll interval.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// How a scenario decides the loaded document has gone quiet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settle {
    /// Sleep for a fixed duration.
    Delay(Duration),

    /// Poll a page expression until it is truthy.
    ///
    /// The expression must become truthy under every policy the scenario
    /// can run with, or the wait times out.
    Expression {
        /// JavaScript evaluated in the page
        expression: String,
        /// Poll timing
        wait: WaitConfig,
    },
}

impl Settle {
    /// Waits until `window[name]` is defined.
    #[must_use]
    pub fn global_defined(name: &str) -> Self {
        let key = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{name}\""));
        Settle::Expression {
            expression: format!("typeof window[{key}] !== 'undefined'"),
            wait: WaitConfig::default(),
        }
    }
}

impl Default for Settle {
    fn default() -> Self {
        Settle::Delay(DEFAULT_SETTLE_DELAY)
    }
}

/// Waits for a condition to become true, with timeout.
///
/// The condition function is called repeatedly at `poll_interval` until
/// it returns true or the timeout expires.
///
/// # Errors
///
/// Returns `WaitTimeout` if the condition never holds.
pub async fn wait_for<F, Fut>(condition: F, config: WaitConfig, description: &str) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let condition = &condition;
    wait_for_result(
        move || async move { Ok(condition().await) },
        config,
        description,
    )
    .await
}

/// Waits for a condition that returns a `Result<bool>`.
///
/// Errors from the condition are treated as "not yet" (a document in the
/// middle of being replaced can reject evaluation), except suite-fatal ones,
/// which are returned immediately.
///
/// # Errors
///
/// Returns `WaitTimeout` if the condition never holds, or the first
/// suite-fatal error the condition reports.
pub async fn wait_for_result<F, Fut>(
    condition: F,
    config: WaitConfig,
    description: &str,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();

    loop {
        match condition().await {
            Ok(true) => return Ok(()),
            Err(e) if e.is_suite_fatal() => return Err(e),
            Ok(false) | Err(_) => {}
        }

        if start.elapsed() >= config.timeout {
            return Err(HarnessError::WaitTimeout {
                condition: description.to_string(),
                timeout: config.timeout,
            });
        }

        sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn wait_for_succeeds_immediately() {
        let result = wait_for(|| async { true }, WaitConfig::default(), "test condition").await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_for_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = wait_for(
            move || {
                let c = counter_clone.clone();
                async move { c.fetch_add(1, Ordering::SeqCst) >= 3 }
            },
            WaitConfig::new(Duration::from_secs(5), Duration::from_millis(5)),
            "counter >= 3",
        )
        .await;

        assert!(result.is_ok());
        assert!(counter.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let result = wait_for(
            || async { false },
            WaitConfig::new(Duration::from_millis(100), Duration::from_millis(10)),
            "impossible condition",
        )
        .await;

        assert!(matches!(result, Err(HarnessError::WaitTimeout { .. })));
    }

    #[tokio::test]
    async fn transient_errors_keep_waiting() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = wait_for_result(
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(HarnessError::ScriptExecutionFailed("context destroyed".into()))
                    } else {
                        Ok(true)
                    }
                }
            },
            WaitConfig::new(Duration::from_secs(1), Duration::from_millis(5)),
            "document ready",
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fatal_errors_stop_waiting() {
        let result = wait_for_result(
            || async { Err(HarnessError::ProcessTerminated) },
            WaitConfig::new(Duration::from_secs(5), Duration::from_millis(5)),
            "document ready",
        )
        .await;

        assert!(matches!(result, Err(HarnessError::ProcessTerminated)));
    }

    #[test]
    fn global_settle_quotes_the_name() {
        let Settle::Expression { expression, .. } = Settle::global_defined("x") else {
            panic!("expected an expression settle");
        };
        assert_eq!(expression, r#"typeof window["x"] !== 'undefined'"#);
    }
}
