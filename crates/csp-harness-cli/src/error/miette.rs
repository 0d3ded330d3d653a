//! Miette diagnostic conversion for CLI errors.

use crate::error::{CliError, ConfigError};
use csp_harness::HarnessError;
use miette::Report;

/// Convert a `CliError` to a miette report with a hint where one helps.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Config(ConfigError::NotFound(path)) => miette::miette!(
            "Manifest not found: {}\n\nHint: create csp-harness.toml or pass --config PATH",
            path.display()
        ),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        CliError::Harness(e) => harness_error_to_miette(e),
        _ => miette::miette!("{}", err),
    }
}

/// Convert a fatal `HarnessError` to a miette report.
pub fn harness_error_to_miette(err: HarnessError) -> Report {
    match err {
        HarnessError::LaunchFailed { reason, source } => {
            let cause = source.map(|s| format!("\nCause: {s}")).unwrap_or_default();
            miette::miette!(
                "Failed to launch Chrome: {}{}\n\nHint: install Chrome or Chromium, or pass --chrome PATH",
                reason,
                cause
            )
        }
        HarnessError::ConnectionFailed(msg) => {
            miette::miette!("Lost the DevTools connection to Chrome: {}", msg)
        }
        HarnessError::ProcessTerminated => {
            miette::miette!("Chrome exited during the suite")
        }
        HarnessError::ContextCrashed(msg) => miette::miette!(
            "The page renderer crashed: {}\n\nHint: rerun with --devtools to watch the failing scenario",
            msg
        ),
        _ => miette::miette!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_manifest_gets_a_hint() {
        let report = cli_error_to_miette(ConfigError::NotFound(PathBuf::from("x.toml")).into());
        let text = report.to_string();
        assert!(text.contains("x.toml"));
        assert!(text.contains("--config"));
    }

    #[test]
    fn launch_failures_suggest_chrome_flag() {
        let report = harness_error_to_miette(HarnessError::LaunchFailed {
            reason: "no executable".into(),
            source: None,
        });
        assert!(report.to_string().contains("--chrome PATH"));
    }

    #[test]
    fn renderer_crashes_are_named() {
        let report = harness_error_to_miette(HarnessError::ContextCrashed("Page crashed!".into()));
        let text = report.to_string();
        assert!(text.contains("renderer crashed"));
        assert!(text.contains("Page crashed!"));
    }
}
