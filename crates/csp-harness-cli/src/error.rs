//! Error types for `csp-check`.
//!
//! Anything surfacing as a [`CliError`] means the harness could not do its
//! job and maps to exit code 2. Failing scenarios are not errors; they are
//! reported and map to exit code 1.

pub mod miette;

use csp_harness::HarnessError;
use std::path::PathBuf;
use thiserror::Error;

pub use self::miette::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// The manifest could not be loaded or describes an invalid suite
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The harness failed fatally (launch, CDP connection, teardown)
    #[error(transparent)]
    Harness(#[from] HarnessError),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Manifest problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file does not exist
    #[error("manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The layered configuration did not extract
    #[error("invalid manifest: {0}")]
    Invalid(String),

    /// The manifest has no `[[scenario]]` entries
    #[error("manifest declares no scenarios")]
    NoScenarios,

    /// One scenario entry is inconsistent
    #[error("scenario `{scenario}`: {message}")]
    InvalidScenario {
        /// Scenario name from the manifest
        scenario: String,
        /// What is wrong with it
        message: String,
    },

    /// A fixture or policy file could not be read
    #[error("scenario `{scenario}`: cannot read {}: {source}", .path.display())]
    Unreadable {
        /// Scenario name from the manifest
        scenario: String,
        /// The resolved file path
        path: PathBuf,
        /// Underlying harness error
        #[source]
        source: HarnessError,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_name_the_scenario() {
        let err = CliError::from(ConfigError::InvalidScenario {
            scenario: "strict".into(),
            message: "set either `policy` or `policy_file`".into(),
        });
        let text = err.to_string();
        assert!(text.starts_with("Configuration error:"));
        assert!(text.contains("`strict`"));
    }

    #[test]
    fn harness_errors_pass_through() {
        let err = CliError::from(HarnessError::ProcessTerminated);
        assert_eq!(err.to_string(), HarnessError::ProcessTerminated.to_string());
    }
}
