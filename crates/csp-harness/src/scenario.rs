//! Scenarios and the runner that sequences them.
//!
//! Every scenario walks the same phases:
//!
//! ```text
//! Idle -> BufferReset -> DocumentLoading -> Settling -> Asserting -> Passed | Failed
//! ```
//!
//! No phase is skipped. A failure in any phase ends that scenario as
//! `Failed`, recording the phase it happened in; it never ends the suite
//! unless the error says the harness itself is broken.

use crate::assertion::{AssertionFailure, SignalExpectation, SignalPattern};
use crate::context::ScenarioHost;
use crate::document::{build_variant, FixtureDocument, PolicyDeclaration};
use crate::error::{HarnessError, Result};
use crate::signal::{Signal, SignalBuffer};
use crate::wait::{wait_for_result, Settle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a scenario is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioPhase {
    /// Not started
    Idle,
    /// Signal buffer cleared
    BufferReset,
    /// Variant built and being loaded
    DocumentLoading,
    /// Waiting for the document to go quiet
    Settling,
    /// Evaluating expectations
    Asserting,
    /// Every expectation held
    Passed,
    /// Something went wrong; see the report
    Failed,
}

impl ScenarioPhase {
    /// The phase that follows a successful step.
    ///
    /// Terminal phases map to themselves.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            ScenarioPhase::Idle => ScenarioPhase::BufferReset,
            ScenarioPhase::BufferReset => ScenarioPhase::DocumentLoading,
            ScenarioPhase::DocumentLoading => ScenarioPhase::Settling,
            ScenarioPhase::Settling => ScenarioPhase::Asserting,
            ScenarioPhase::Asserting | ScenarioPhase::Passed => ScenarioPhase::Passed,
            ScenarioPhase::Failed => ScenarioPhase::Failed,
        }
    }

    /// Returns true for `Passed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ScenarioPhase::Passed | ScenarioPhase::Failed)
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioPhase::Idle => "idle",
            ScenarioPhase::BufferReset => "buffer reset",
            ScenarioPhase::DocumentLoading => "document loading",
            ScenarioPhase::Settling => "settling",
            ScenarioPhase::Asserting => "asserting",
            ScenarioPhase::Passed => "passed",
            ScenarioPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An expectation on a page expression after settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalExpectation {
    /// JavaScript expression, e.g. `window.x`
    pub expression: String,
    /// Expected JSON value; `None` means the expression must be undefined.
    pub equals: Option<Value>,
}

impl GlobalExpectation {
    /// Expects `expression` to evaluate to `value`.
    pub fn equals(expression: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            expression: expression.into(),
            equals: Some(value.into()),
        }
    }

    /// Expects `expression` to be undefined (the script that would have set
    /// it never ran).
    pub fn undefined(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            equals: None,
        }
    }

    fn check(&self, observed: Option<&Value>) -> std::result::Result<(), AssertionFailure> {
        if observed == self.equals.as_ref() {
            return Ok(());
        }
        let show = |v: Option<&Value>| v.map_or_else(|| "undefined".to_string(), Value::to_string);
        Err(AssertionFailure::new(format!(
            "expected `{}` to be {}, was {}",
            self.expression,
            show(self.equals.as_ref()),
            show(observed)
        )))
    }
}

/// One fixture, one policy, and what should happen when they meet.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Name shown in reports
    pub name: String,
    /// Template document
    pub fixture: FixtureDocument,
    /// Policy injected into the fixture's head
    pub policy: PolicyDeclaration,
    /// Quiescence strategy; `None` uses the runner's default
    pub settle: Option<Settle>,
    /// Predicates over captured signals
    pub signals: Vec<SignalExpectation>,
    /// Predicates over page state
    pub globals: Vec<GlobalExpectation>,
    /// Suppress re-logging of captured signals while the scenario runs
    pub muted: bool,
}

impl Scenario {
    /// Creates a scenario with no expectations.
    pub fn new(name: impl Into<String>, fixture: FixtureDocument, policy: PolicyDeclaration) -> Self {
        Self {
            name: name.into(),
            fixture,
            policy,
            settle: None,
            signals: Vec::new(),
            globals: Vec::new(),
            muted: false,
        }
    }

    /// Expects no signals at all.
    #[must_use]
    pub fn expect_no_signals(mut self) -> Self {
        self.signals.push(SignalExpectation::Empty);
        self
    }

    /// Expects at least one signal matching `pattern`.
    #[must_use]
    pub fn expect_signal(mut self, pattern: SignalPattern) -> Self {
        self.signals.push(SignalExpectation::Contains(pattern));
        self
    }

    /// Expects a CSP violation report, and mutes re-logging since the
    /// violation is the point.
    #[must_use]
    pub fn expect_violation(self) -> Self {
        self.expect_signal(SignalPattern::csp_violation()).muted()
    }

    /// Adds an arbitrary signal expectation.
    #[must_use]
    pub fn expect(mut self, expectation: SignalExpectation) -> Self {
        self.signals.push(expectation);
        self
    }

    /// Adds a page-state expectation.
    #[must_use]
    pub fn expect_global(mut self, expectation: GlobalExpectation) -> Self {
        self.globals.push(expectation);
        self
    }

    /// Overrides the settle strategy.
    #[must_use]
    pub fn settle(mut self, settle: Settle) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Mutes re-logging of captured signals.
    #[must_use]
    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }
}

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// Every expectation held.
    Pass,
    /// The scenario failed.
    Fail {
        /// Phase the failure happened in
        phase: ScenarioPhase,
        /// Human-readable reason
        message: String,
    },
}

impl ScenarioOutcome {
    /// Returns true for `Pass`.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, ScenarioOutcome::Pass)
    }
}

/// Result of running one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Pass or fail
    pub outcome: ScenarioOutcome,
    /// Every signal captured during the scenario, unfiltered
    pub signals: Vec<Signal>,
    /// Wall-clock time spent
    pub duration: Duration,
}

impl ScenarioReport {
    pub(crate) fn failed(
        name: &str,
        phase: ScenarioPhase,
        error: &HarnessError,
        signals: Vec<Signal>,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            outcome: ScenarioOutcome::Fail {
                phase,
                message: error.to_string(),
            },
            signals,
            duration,
        }
    }
}

/// A scenario that stopped in `phase` with `error`.
#[derive(Debug)]
pub(crate) struct PhaseError {
    pub phase: ScenarioPhase,
    pub error: HarnessError,
}

/// Runs scenarios one after another against a single host.
///
/// Scenarios never overlap: the host and its signal buffer are shared, and
/// concurrent runs would interleave signals beyond attribution.
#[derive(Debug)]
pub struct ScenarioRunner<'h, H: ScenarioHost> {
    host: &'h H,
    default_settle: Settle,
    phase: ScenarioPhase,
}

impl<'h, H: ScenarioHost> ScenarioRunner<'h, H> {
    /// Creates a runner over `host`.
    pub fn new(host: &'h H, default_settle: Settle) -> Self {
        Self {
            host,
            default_settle,
            phase: ScenarioPhase::Idle,
        }
    }

    /// The phase the most recent scenario reached.
    #[must_use]
    pub fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    /// Runs one scenario to completion and reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error only when it is suite-fatal; scenario-local failures
    /// are folded into the returned report.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<ScenarioReport> {
        let started = Instant::now();
        info!(scenario = %scenario.name, "running scenario");

        let result = self.drive(scenario).await;

        // Restore logging for whatever runs next, whatever happened here.
        self.host.signals().unmute();
        let signals = self.host.signals().snapshot();

        match result {
            Ok(()) => {
                self.enter(ScenarioPhase::Passed);
                info!(scenario = %scenario.name, "scenario passed");
                Ok(ScenarioReport {
                    name: scenario.name.clone(),
                    outcome: ScenarioOutcome::Pass,
                    signals,
                    duration: started.elapsed(),
                })
            }
            Err(PhaseError { error, .. }) if error.is_suite_fatal() => {
                self.enter(ScenarioPhase::Failed);
                Err(error)
            }
            Err(PhaseError { phase, error }) => {
                self.enter(ScenarioPhase::Failed);
                warn!(scenario = %scenario.name, %phase, "scenario failed: {}", error);
                Ok(ScenarioReport::failed(
                    &scenario.name,
                    phase,
                    &error,
                    signals,
                    started.elapsed(),
                ))
            }
        }
    }

    async fn drive(&mut self, scenario: &Scenario) -> std::result::Result<(), PhaseError> {
        self.phase = ScenarioPhase::Idle;

        let host = self.host;

        self.advance();
        let signals = host.signals();
        signals.reset();
        if scenario.muted {
            signals.mute();
        }

        self.advance();
        let variant = build_variant(&scenario.fixture, &scenario.policy).map_err(|e| self.fail(e))?;
        host.load(&variant).await.map_err(|e| self.fail(e))?;
        ensure_alive(signals).map_err(|e| self.fail(e))?;

        self.advance();
        let settle = scenario.settle.as_ref().unwrap_or(&self.default_settle);
        self.settle(settle).await.map_err(|e| self.fail(e))?;
        ensure_alive(signals).map_err(|e| self.fail(e))?;

        self.advance();
        let captured = signals.snapshot();
        for expectation in &scenario.signals {
            expectation
                .check(&captured)
                .map_err(|e| self.fail(e.into()))?;
        }
        for expectation in &scenario.globals {
            let observed = host
                .observe(&expectation.expression)
                .await
                .map_err(|e| self.fail(e))?;
            expectation
                .check(observed.as_ref())
                .map_err(|e| self.fail(e.into()))?;
        }

        Ok(())
    }

    async fn settle(&self, settle: &Settle) -> Result<()> {
        match settle {
            Settle::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            Settle::Expression { expression, wait } => {
                let predicate = format!("!!({expression})");
                wait_for_result(
                    || {
                        let predicate = predicate.clone();
                        async move { Ok(self.host.evaluate(&predicate).await?.as_bool() == Some(true)) }
                    },
                    *wait,
                    expression,
                )
                .await
            }
        }
    }

    fn advance(&mut self) {
        self.enter(self.phase.next());
    }

    fn enter(&mut self, phase: ScenarioPhase) {
        debug!(from = %self.phase, to = %phase, "scenario phase");
        self.phase = phase;
    }

    fn fail(&self, error: HarnessError) -> PhaseError {
        PhaseError {
            phase: self.phase,
            error,
        }
    }
}

/// A crashed renderer takes the context down with it.
fn ensure_alive(signals: &SignalBuffer) -> Result<()> {
    match signals.crash() {
        Some(crash) => Err(HarnessError::ContextCrashed(crash.message)),
        None => Ok(()),
    }
}
