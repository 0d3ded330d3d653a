//! Error types for conformance harness operations.
//!
//! The taxonomy separates failures of the harness itself (the browser could
//! not start, the CDP connection dropped) from failures of an individual
//! scenario (a fixture without a `<head>`, a timeout, an assertion that did
//! not hold). Automation consuming a suite run relies on that split to tell
//! "policy enforcement behaved unexpectedly" apart from "the harness is
//! broken"; see [`HarnessError::is_suite_fatal`].

use chromiumoxide::error::CdpError;
use std::time::Duration;
use thiserror::Error;

use crate::assertion::AssertionFailure;

/// The main error type for all harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Failed to launch the browser process.
    ///
    /// This typically occurs when Chrome/Chromium is not installed,
    /// or when there are permission issues with the executable.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed {
        /// Human-readable reason for the launch failure
        reason: String,
        /// Optional underlying error that caused the failure
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to establish or use the Chrome `DevTools` Protocol connection.
    #[error("CDP connection failed: {0}")]
    ConnectionFailed(String),

    /// The browser process crashed or was killed unexpectedly.
    #[error("browser process terminated unexpectedly")]
    ProcessTerminated,

    /// The renderer behind the browsing context crashed.
    #[error("browsing context crashed: {0}")]
    ContextCrashed(String),

    /// The fixture has no `<head>` element to anchor the policy on.
    #[error("fixture '{fixture}' has no <head> element to anchor the policy")]
    MalformedFixture {
        /// Name of the offending fixture
        fixture: String,
    },

    /// Loading a document variant into the context failed.
    #[error("loading document '{document}' failed: {reason}")]
    LoadFailed {
        /// Name of the fixture the variant was built from
        document: String,
        /// Reason reported by the engine
        reason: String,
    },

    /// A wait condition was not satisfied within the timeout.
    #[error("wait condition '{condition}' timed out after {timeout:?}")]
    WaitTimeout {
        /// Description of the condition that timed out
        condition: String,
        /// How long we waited before timing out
        timeout: Duration,
    },

    /// A whole scenario exceeded the suite's per-scenario upper bound.
    #[error("scenario '{scenario}' timed out after {timeout:?}")]
    ScenarioTimeout {
        /// Name of the scenario
        scenario: String,
        /// The bound that was exceeded
        timeout: Duration,
    },

    /// JavaScript evaluation in the page context failed.
    #[error("JavaScript execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// An expectation over the captured signals or page state did not hold.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// Wraps errors from the chromiumoxide library.
    #[error("chromiumoxide error: {0}")]
    ChromiumOxide(#[from] CdpError),

    /// Reading a fixture or policy source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Returns true if the error means the harness itself is broken and the
    /// suite cannot continue.
    ///
    /// Everything else fails only the scenario that raised it.
    #[must_use]
    pub fn is_suite_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::LaunchFailed { .. }
                | HarnessError::ConnectionFailed(_)
                | HarnessError::ProcessTerminated
                | HarnessError::ContextCrashed(_)
                | HarnessError::ChromiumOxide(_)
        )
    }

    /// Maps a CDP failure from a page operation.
    ///
    /// Failures that mean the engine or the connection to it is gone stay
    /// `ChromiumOxide` and are suite-fatal. Anything the page itself caused
    /// (navigation errors, script exceptions, bad results) goes through
    /// `local` and fails only the current scenario.
    pub(crate) fn from_cdp(err: CdpError, local: impl FnOnce(String) -> HarnessError) -> Self {
        if is_connection_loss(&err) {
            HarnessError::ChromiumOxide(err)
        } else {
            local(err.to_string())
        }
    }

    /// Returns true for either kind of timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            HarnessError::WaitTimeout { .. } | HarnessError::ScenarioTimeout { .. }
        )
    }
}

/// A request timeout counts as loss too: the handler answers every request
/// while the browser is alive, however busy the page is.
fn is_connection_loss(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_)
            | CdpError::Io(_)
            | CdpError::NoResponse
            | CdpError::UnexpectedWsMessage(_)
            | CdpError::ChannelSendError(_)
            | CdpError::LaunchExit(..)
            | CdpError::LaunchTimeout(_)
            | CdpError::LaunchIo(..)
            | CdpError::Timeout
    )
}

/// A specialized Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
