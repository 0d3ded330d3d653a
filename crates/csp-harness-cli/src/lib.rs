//! csp-check - command-line runner for `csp-harness` suites.
//!
//! Suites are described in a TOML manifest (see [`config`]). The binary
//! loads it, runs every scenario in one Chrome session, prints a summary
//! (or JSON with `--json`), and exits 0 when all scenarios pass, 1 when any
//! fails, 2 when the harness cannot run.

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod report;

pub use error::{CliError, ConfigError, Result};

/// Exit code when every scenario passed.
pub const EXIT_PASS: u8 = 0;
/// Exit code when at least one scenario failed.
pub const EXIT_FAIL: u8 = 1;
/// Exit code when the harness itself failed.
pub const EXIT_FATAL: u8 = 2;
