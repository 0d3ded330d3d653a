//! # csp-harness
//!
//! A conformance harness that checks, by driving a real headless Chrome, that
//! a document's Content-Security-Policy is enforced: inline scripts the
//! policy forbids are blocked and reported, scripts it whitelists run.
//!
//! Policy parsing and enforcement are entirely the engine's business. This
//! crate only injects policies into fixture documents, loads them, captures
//! what the engine reports, and compares that against expectations.
//!
//! ## Architecture
//!
//! - **Session**: owns the Chrome process for a whole suite
//! - **BrowsingContext / ObservedContext**: one tab; attaching the signal
//!   listeners is what unlocks document loading
//! - **SignalBuffer**: ordered capture of console errors, uncaught page
//!   errors, and context errors
//! - **DocumentVariant**: a fixture with a `<meta>` policy injected in its head
//! - **ScenarioRunner**: reset, load, settle, assert; one scenario at a time
//! - **Suite**: scoped session acquisition with guaranteed teardown
//!
//! ## Example Usage
//!
//! ```ignore
//! use csp_harness::{
//!     FixtureDocument, GlobalExpectation, PolicyDeclaration, Scenario, ScriptHash, Suite,
//!     SuiteConfig,
//! };
//!
//! #[tokio::test]
//! async fn inline_script_policy() -> Result<(), Box<dyn std::error::Error>> {
//!     let fixture = FixtureDocument::from_file("fixtures/a.html")?;
//!     let hash = ScriptHash::sha256("window.x = 3;");
//!
//!     let report = Suite::new(SuiteConfig::default())
//!         .scenario(
//!             Scenario::new("strict", fixture.clone(), PolicyDeclaration::literal("default-src 'self'"))
//!                 .expect_violation()
//!                 .expect_global(GlobalExpectation::undefined("window.x")),
//!         )
//!         .scenario(
//!             Scenario::new("hashed", fixture, PolicyDeclaration::literal(format!("script-src {hash}")))
//!                 .expect_no_signals()
//!                 .expect_global(GlobalExpectation::equals("window.x", 3)),
//!         )
//!         .run()
//!         .await?;
//!
//!     assert!(report.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Testing Strategy
//!
//! 1. **Unit tests**: document building, policy normalization, assertions,
//!    and the runner/suite state machine against an in-memory host
//! 2. **Integration tests**: real browser tests (require Chrome installed)
//!
//! Run with `cargo test` (unit) or `cargo test -- --ignored` (integration).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assertion;
pub mod browser;
pub mod context;
pub mod document;
pub mod error;
pub mod hash;
pub mod scenario;
pub mod signal;
pub mod suite;
pub mod wait;

// Re-export main types for convenience
pub use assertion::{
    assert_contains_matching, assert_empty, assert_first_matches, AssertionFailure,
    SignalExpectation, SignalPattern, CSP_VIOLATION,
};
pub use browser::{Engine, Session, SessionConfig, Viewport};
pub use context::{BrowsingContext, ObservedContext, ScenarioHost};
pub use document::{build_variant, DocumentVariant, FixtureDocument, PolicyDeclaration};
pub use error::{HarnessError, Result};
pub use hash::ScriptHash;
pub use scenario::{
    GlobalExpectation, Scenario, ScenarioOutcome, ScenarioPhase, ScenarioReport, ScenarioRunner,
};
pub use signal::{Signal, SignalBuffer, SignalKind};
pub use suite::{Suite, SuiteConfig, SuiteReport, DEFAULT_SCENARIO_TIMEOUT};
pub use wait::{Settle, WaitConfig, DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY, DEFAULT_TIMEOUT};
