//! Suite driver: one engine, many scenarios, guaranteed teardown.
//!
//! The engine is acquired once, every scenario runs sequentially on its
//! single context, and the engine is stopped exactly once on every exit
//! path, including scenario timeouts, assertion failures and suite-fatal
//! errors.

use crate::browser::{Engine, Session, SessionConfig};
use crate::context::ScenarioHost;
use crate::error::{HarnessError, Result};
use crate::scenario::{Scenario, ScenarioReport, ScenarioRunner};
use crate::wait::Settle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default upper bound for a single scenario, browser startup included.
pub const DEFAULT_SCENARIO_TIMEOUT: Duration = Duration::from_secs(60);

/// Suite-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteConfig {
    /// Browser launch options
    pub session: SessionConfig,
    /// Upper bound for one scenario; exceeding it fails that scenario
    pub scenario_timeout: Duration,
    /// Settle strategy for scenarios that do not set their own
    pub default_settle: Settle,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            scenario_timeout: DEFAULT_SCENARIO_TIMEOUT,
            default_settle: Settle::default(),
        }
    }
}

/// Outcome of a whole suite run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    /// One report per scenario, in run order
    pub scenarios: Vec<ScenarioReport>,
    /// Wall-clock time including engine startup and teardown
    pub duration: Duration,
}

impl SuiteReport {
    /// Number of passing scenarios.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.scenarios.iter().filter(|s| s.outcome.is_pass()).count()
    }

    /// Number of failing scenarios.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.scenarios.len() - self.passed()
    }

    /// Returns true if every scenario passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// An ordered list of scenarios and the config to run them with.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    config: SuiteConfig,
    scenarios: Vec<Scenario>,
}

impl Suite {
    /// Creates an empty suite.
    #[must_use]
    pub fn new(config: SuiteConfig) -> Self {
        Self {
            config,
            scenarios: Vec::new(),
        }
    }

    /// Appends a scenario.
    #[must_use]
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// The scenarios in run order.
    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// The suite's configuration.
    #[must_use]
    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Launches Chrome and runs every scenario.
    ///
    /// # Errors
    ///
    /// Returns a suite-fatal error if Chrome cannot be launched or the
    /// harness breaks mid-run. Scenario failures are in the report.
    pub async fn run(&self) -> Result<SuiteReport> {
        let started = Instant::now();
        let session = Session::start(&self.config.session).await?;
        let mut report = self.run_with(session).await?;
        report.duration = started.elapsed();
        Ok(report)
    }

    /// Runs every scenario on `engine`, then stops it.
    ///
    /// # Errors
    ///
    /// Returns the first suite-fatal error. The engine is stopped before
    /// returning in every case.
    pub async fn run_with<E: Engine>(&self, engine: E) -> Result<SuiteReport> {
        let started = Instant::now();
        let outcome = self.run_scenarios(&engine).await;

        let stopped = engine.stop().await;

        match (outcome, stopped) {
            (Ok(mut report), Ok(())) => {
                report.duration = started.elapsed();
                info!(
                    passed = report.passed(),
                    failed = report.failed(),
                    "suite finished"
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => {
                error!("teardown failed: {}", e);
                Err(e)
            }
            (Err(e), stopped) => {
                if let Err(teardown) = stopped {
                    warn!("teardown after fatal error also failed: {}", teardown);
                }
                error!("suite aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn run_scenarios<E: Engine>(&self, engine: &E) -> Result<SuiteReport> {
        let host = engine.open_context().await?;
        let mut runner = ScenarioRunner::new(&host, self.config.default_settle.clone());
        let mut reports = Vec::with_capacity(self.scenarios.len());
        let timeout = self.config.scenario_timeout;

        for scenario in &self.scenarios {
            let started = Instant::now();
            match tokio::time::timeout(timeout, runner.run(scenario)).await {
                Ok(report) => reports.push(report?),
                Err(_) => {
                    let phase = runner.phase();
                    let err = HarnessError::ScenarioTimeout {
                        scenario: scenario.name.clone(),
                        timeout,
                    };
                    warn!(scenario = %scenario.name, %phase, "{}", err);
                    host.signals().unmute();
                    reports.push(ScenarioReport::failed(
                        &scenario.name,
                        phase,
                        &err,
                        host.signals().snapshot(),
                        started.elapsed(),
                    ));
                }
            }
        }

        Ok(SuiteReport {
            scenarios: reports,
            duration: Duration::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::tests::{strict, whitelisted, FakeHost};
    use crate::scenario::{ScenarioOutcome, ScenarioPhase};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default, Clone, Copy)]
    enum Fault {
        #[default]
        None,
        HangLoads,
        FatalLoads,
        OpenFails,
    }

    #[derive(Debug, Default)]
    struct FakeEngine {
        stops: Arc<AtomicUsize>,
        fault: Fault,
    }

    #[async_trait]
    impl Engine for FakeEngine {
        type Host = FakeHost;

        async fn open_context(&self) -> Result<FakeHost> {
            let mut host = FakeHost::default();
            match self.fault {
                Fault::None => {}
                Fault::HangLoads => host.hang_loads = true,
                Fault::FatalLoads => {
                    *host.fail_loads_with.lock().unwrap() =
                        Some(|| HarnessError::ConnectionFailed("socket closed".into()));
                }
                Fault::OpenFails => return Err(HarnessError::ConnectionFailed("target closed".into())),
            }
            Ok(host)
        }

        async fn stop(self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn suite() -> Suite {
        Suite::new(SuiteConfig {
            scenario_timeout: Duration::from_millis(200),
            default_settle: Settle::Delay(Duration::ZERO),
            ..SuiteConfig::default()
        })
        .scenario(strict())
        .scenario(whitelisted())
    }

    #[tokio::test]
    async fn all_scenarios_pass_and_teardown_runs_once() {
        let engine = FakeEngine::default();
        let stops = engine.stops.clone();

        let report = suite().run_with(engine).await.unwrap();

        assert_eq!(report.passed(), 2);
        assert!(report.is_success());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn assertion_failures_do_not_stop_the_suite() {
        let engine = FakeEngine::default();
        let stops = engine.stops.clone();
        let failing = whitelisted().expect(crate::assertion::SignalExpectation::Contains(
            crate::assertion::SignalPattern::containing("never emitted"),
        ));

        let report = suite()
            .scenario(failing)
            .scenario(strict())
            .run_with(engine)
            .await
            .unwrap();

        assert_eq!(report.scenarios.len(), 4);
        assert_eq!(report.failed(), 1);
        assert!(report.scenarios[3].outcome.is_pass());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeouts_fail_scenarios_and_still_tear_down() {
        let engine = FakeEngine {
            fault: Fault::HangLoads,
            ..FakeEngine::default()
        };
        let stops = engine.stops.clone();

        let report = suite().run_with(engine).await.unwrap();

        assert_eq!(report.failed(), 2);
        for scenario in &report.scenarios {
            match &scenario.outcome {
                ScenarioOutcome::Fail { phase, message } => {
                    assert_eq!(*phase, ScenarioPhase::DocumentLoading);
                    assert!(message.contains("timed out"));
                }
                ScenarioOutcome::Pass => panic!("hung scenario cannot pass"),
            }
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_errors_abort_but_still_tear_down() {
        let engine = FakeEngine {
            fault: Fault::FatalLoads,
            ..FakeEngine::default()
        };
        let stops = engine.stops.clone();

        let err = suite().run_with(engine).await.unwrap_err();

        assert!(err.is_suite_fatal());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn context_open_failure_still_tears_down() {
        let engine = FakeEngine {
            fault: Fault::OpenFails,
            ..FakeEngine::default()
        };
        let stops = engine.stops.clone();

        let err = suite().run_with(engine).await.unwrap_err();

        assert!(matches!(err, HarnessError::ConnectionFailed(_)));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_report_is_a_success() {
        let report = SuiteReport::default();
        assert!(report.is_success());
        assert_eq!(report.failed(), 0);
    }
}
