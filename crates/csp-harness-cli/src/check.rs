//! The one thing `csp-check` does: load the manifest and run it.

use crate::cli::Cli;
use crate::config::{self, Manifest};
use crate::error::Result;
use csp_harness::SuiteReport;
use tracing::info;

/// Loads the manifest named by `cli` and runs its suite.
///
/// # Errors
///
/// Configuration errors and suite-fatal harness errors. Failing scenarios
/// are in the returned report.
pub async fn execute(cli: &Cli) -> Result<SuiteReport> {
    let path = cli.manifest_path();
    let manifest = Manifest::load(cli)?;
    let suite = manifest.into_suite(&config::base_dir(&path))?;

    info!(
        scenarios = suite.scenarios().len(),
        manifest = %path.display(),
        "running suite"
    );

    Ok(suite.run().await?)
}
