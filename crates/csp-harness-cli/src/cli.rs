//! Command-line interface definition for `csp-check`.
//!
//! There are no subcommands: every invocation loads a manifest, runs the
//! suite it describes, and reports. Flags given here override the manifest.

use clap::Parser;
use std::path::PathBuf;

/// Manifest looked up in the working directory when `--config` is absent.
pub const DEFAULT_MANIFEST: &str = "csp-harness.toml";

/// csp-check - verify that Chrome enforces your Content-Security-Policy
#[derive(Parser, Debug, Default)]
#[command(
    name = "csp-check",
    version,
    about = "Verify Content-Security-Policy enforcement in headless Chrome",
    long_about = "csp-check loads fixture documents into a real Chrome with a policy injected\n\
                  into each one, captures the console errors and page errors the engine\n\
                  reports, and checks them against the expectations in a TOML manifest.\n\n\
                  Exit codes: 0 when every scenario passes, 1 when any scenario fails,\n\
                  2 when the harness itself cannot run."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to the suite manifest
    ///
    /// Fixture and policy paths inside the manifest are resolved relative
    /// to the manifest's own directory.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    pub headful: bool,

    /// Open DevTools for the tab (implies --headful)
    #[arg(long)]
    pub devtools: bool,

    /// Chrome or Chromium executable to launch
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,

    /// Per-scenario timeout in milliseconds
    #[arg(long, value_name = "N")]
    pub timeout_ms: Option<u64>,

    /// Print the suite report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// The manifest path to load.
    pub fn manifest_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "csp-check",
            "--config",
            "suite.toml",
            "--devtools",
            "--chrome",
            "/opt/chrome",
            "--timeout-ms",
            "5000",
            "--json",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.manifest_path(), PathBuf::from("suite.toml"));
        assert!(cli.devtools);
        assert_eq!(cli.chrome, Some(PathBuf::from("/opt/chrome")));
        assert_eq!(cli.timeout_ms, Some(5000));
        assert!(cli.json);
        assert!(cli.verbose);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["csp-check", "-v", "-q"]).is_err());
    }

    #[test]
    fn manifest_defaults_to_working_directory() {
        let cli = Cli::try_parse_from(["csp-check"]).unwrap();
        assert_eq!(cli.manifest_path(), PathBuf::from(DEFAULT_MANIFEST));
    }
}
