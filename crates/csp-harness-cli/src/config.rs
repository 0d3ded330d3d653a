//! Suite manifest loading.
//!
//! A manifest is a TOML file with optional `[browser]` and `[suite]` tables
//! and one `[[scenario]]` table per scenario:
//!
//! ```toml
//! [browser]
//! headless = true
//! viewport = { width = 1280, height = 720 }
//!
//! [suite]
//! scenario_timeout_ms = 60000
//!
//! [[scenario]]
//! name = "strict policy blocks the inline script"
//! fixture = "fixtures/a.html"
//! policy = "default-src 'self';"
//! expect_violation = true
//! globals = [{ expression = "window.x" }]
//!
//! [[scenario]]
//! name = "hashed policy lets it run"
//! fixture = "fixtures/a.html"
//! policy_file = "fixtures/csp_header.txt"
//! signals = [{ expect = "empty" }]
//! globals = [{ expression = "window.x", equals = 3 }]
//! ```
//!
//! Layers, lowest to highest priority: built-in defaults, the manifest,
//! `CSP_HARNESS_*` environment variables (`__` separates nesting, e.g.
//! `CSP_HARNESS_BROWSER__HEADLESS=false`), then command-line flags.

use crate::cli::Cli;
use crate::error::{ConfigError, Result};
use csp_harness::{
    DEFAULT_SCENARIO_TIMEOUT, DEFAULT_SETTLE_DELAY, FixtureDocument, GlobalExpectation,
    PolicyDeclaration, Scenario, SessionConfig, Settle, SignalExpectation, Suite, SuiteConfig,
    Viewport,
};
use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix for manifest overrides.
pub const ENV_PREFIX: &str = "CSP_HARNESS_";

/// The whole manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Browser launch options
    #[serde(default)]
    pub browser: BrowserSection,
    /// Suite-wide timing
    #[serde(default)]
    pub suite: SuiteSection,
    /// Scenarios in run order
    #[serde(default)]
    pub scenario: Vec<ScenarioEntry>,
}

/// `[browser]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSection {
    pub headless: bool,
    pub devtools: bool,
    pub chrome_path: Option<PathBuf>,
    pub viewport: Viewport,
    /// Extra Chrome arguments, appended to the sandbox defaults
    pub args: Vec<String>,
    pub request_timeout_ms: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            headless: session.headless,
            devtools: session.devtools,
            chrome_path: None,
            viewport: session.viewport,
            args: Vec::new(),
            request_timeout_ms: millis(session.request_timeout),
        }
    }
}

/// `[suite]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteSection {
    pub scenario_timeout_ms: u64,
    /// Settle delay for scenarios that set neither `settle_ms` nor `settle_until`
    pub settle_ms: u64,
}

impl Default for SuiteSection {
    fn default() -> Self {
        Self {
            scenario_timeout_ms: millis(DEFAULT_SCENARIO_TIMEOUT),
            settle_ms: millis(DEFAULT_SETTLE_DELAY),
        }
    }
}

/// One `[[scenario]]` table.
///
/// Exactly one of `policy` and `policy_file` must be set. Policy files may
/// carry `#` comments, which are stripped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioEntry {
    pub name: String,
    pub fixture: PathBuf,
    pub policy: Option<String>,
    pub policy_file: Option<PathBuf>,
    /// Shorthand for a CSP-violation `contains` expectation plus `muted`
    pub expect_violation: bool,
    pub signals: Vec<SignalExpectation>,
    pub globals: Vec<GlobalExpectation>,
    pub settle_ms: Option<u64>,
    /// Settle once this window global is defined
    pub settle_until: Option<String>,
    pub muted: bool,
}

impl Manifest {
    /// Loads the layered configuration for `cli`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the manifest file is missing, `Invalid` if any layer
    /// fails to deserialize.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli.manifest_path();
        if !path.is_file() {
            return Err(ConfigError::NotFound(path).into());
        }
        debug!("loading manifest {}", path.display());

        let figment = Self::figment(&path, cli);
        let manifest: Manifest = figment.extract().map_err(ConfigError::from)?;
        Ok(manifest)
    }

    fn figment(path: &Path, cli: &Cli) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Manifest::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        // Flags only override when given, so the manifest keeps its values otherwise.
        if cli.headful || cli.devtools {
            figment = figment.merge(Serialized::default("browser.headless", false));
        }
        if cli.devtools {
            figment = figment.merge(Serialized::default("browser.devtools", true));
        }
        if let Some(chrome) = &cli.chrome {
            figment = figment.merge(Serialized::default("browser.chrome_path", chrome));
        }
        if let Some(timeout) = cli.timeout_ms {
            figment = figment.merge(Serialized::default("suite.scenario_timeout_ms", timeout));
        }
        figment
    }

    /// Builds the suite, resolving relative paths against `base_dir`.
    ///
    /// # Errors
    ///
    /// `NoScenarios` for an empty manifest; `InvalidScenario` or
    /// `Unreadable` for a bad scenario entry.
    pub fn into_suite(self, base_dir: &Path) -> Result<Suite> {
        if self.scenario.is_empty() {
            return Err(ConfigError::NoScenarios.into());
        }

        let config = SuiteConfig {
            session: self.browser.session_config(),
            scenario_timeout: Duration::from_millis(self.suite.scenario_timeout_ms),
            default_settle: Settle::Delay(Duration::from_millis(self.suite.settle_ms)),
        };

        let mut suite = Suite::new(config);
        for entry in self.scenario {
            suite = suite.scenario(entry.into_scenario(base_dir)?);
        }
        Ok(suite)
    }
}

impl BrowserSection {
    fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new().with_args(self.args.iter().cloned());
        session.headless = self.headless;
        session.viewport = self.viewport;
        session.request_timeout = Duration::from_millis(self.request_timeout_ms);
        if self.devtools {
            session = session.with_devtools();
        }
        if let Some(path) = &self.chrome_path {
            session = session.with_chrome_path(path);
        }
        session
    }
}

impl ScenarioEntry {
    fn into_scenario(self, base_dir: &Path) -> Result<Scenario> {
        let invalid = |message: &str| ConfigError::InvalidScenario {
            scenario: self.name.clone(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidScenario {
                scenario: self.fixture.display().to_string(),
                message: "`name` is required".into(),
            }
            .into());
        }
        if self.fixture.as_os_str().is_empty() {
            return Err(invalid("`fixture` is required").into());
        }
        if self.settle_ms.is_some() && self.settle_until.is_some() {
            return Err(invalid("set at most one of `settle_ms` and `settle_until`").into());
        }

        let fixture_path = base_dir.join(&self.fixture);
        let fixture = FixtureDocument::from_file(&fixture_path)
            .map_err(|source| self.unreadable(fixture_path.clone(), source))?;

        let policy = match (&self.policy, &self.policy_file) {
            (Some(literal), None) => PolicyDeclaration::literal(literal),
            (None, Some(file)) => {
                let policy_path = base_dir.join(file);
                PolicyDeclaration::from_file(&policy_path)
                    .map_err(|source| self.unreadable(policy_path.clone(), source))?
            }
            _ => return Err(invalid("set exactly one of `policy` and `policy_file`").into()),
        };

        let settle = match (self.settle_ms, &self.settle_until) {
            (Some(ms), None) => Some(Settle::Delay(Duration::from_millis(ms))),
            (None, Some(global)) => Some(Settle::global_defined(global)),
            _ => None,
        };

        let mut scenario = Scenario::new(self.name, fixture, policy);
        scenario.settle = settle;
        if self.expect_violation {
            scenario = scenario.expect_violation();
        }
        for expectation in self.signals {
            scenario = scenario.expect(expectation);
        }
        for global in self.globals {
            scenario = scenario.expect_global(global);
        }
        if self.muted {
            scenario = scenario.muted();
        }
        Ok(scenario)
    }

    fn unreadable(&self, path: PathBuf, source: csp_harness::HarnessError) -> ConfigError {
        ConfigError::Unreadable {
            scenario: self.name.clone(),
            path,
            source,
        }
    }
}

/// Directory manifest-relative paths resolve against.
pub fn base_dir(manifest: &Path) -> PathBuf {
    match manifest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
