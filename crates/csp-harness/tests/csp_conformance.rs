//! Conformance tests against a real Chrome.
//!
//! These tests require Chrome/Chromium to be installed and are marked #[ignore]
//! by default. Run with: cargo test --package csp-harness -- --ignored

use csp_harness::{
    assert_contains_matching, assert_empty, GlobalExpectation, PolicyDeclaration, Scenario,
    ScenarioHost, ScriptHash, Session, SessionConfig, Settle, SignalKind, SignalPattern, Suite,
    SuiteConfig, CSP_VIOLATION,
};
use csp_harness::{FixtureDocument, WaitConfig};
use std::path::PathBuf;
use std::time::Duration;

const STRICT: &str = "default-src 'self' 'report-sample';";

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

fn fixture() -> FixtureDocument {
    FixtureDocument::from_file(fixture_path("a.html")).expect("fixture a.html")
}

fn hashed_policy() -> PolicyDeclaration {
    PolicyDeclaration::from_file(fixture_path("csp_header.txt")).expect("csp_header.txt")
}

fn strict_scenario() -> Scenario {
    Scenario::new("strict CSP logs violations", fixture(), PolicyDeclaration::literal(STRICT))
        .expect_violation()
        .expect_global(GlobalExpectation::undefined("window.x"))
}

fn hashed_scenario() -> Scenario {
    Scenario::new("whitelisted CSP hashes run", fixture(), hashed_policy())
        .expect_no_signals()
        .expect_global(GlobalExpectation::equals("window.x", 3))
}

#[test]
fn bundled_policy_whitelists_the_bundled_script() {
    let hash = ScriptHash::sha256("window.x = 3;");
    assert!(fixture().html().contains("<script>window.x = 3;</script>"));
    assert!(hashed_policy().directives().contains(&hash.source_expression()));
    assert!(!hashed_policy().directives().contains('#'));
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn strict_policy_blocks_inline_script() {
    let session = Session::start(&SessionConfig::default())
        .await
        .expect("failed to launch");
    let context = session
        .new_context()
        .await
        .expect("failed to open context")
        .attach()
        .await
        .expect("failed to attach listeners");

    let variant = csp_harness::build_variant(&fixture(), &PolicyDeclaration::literal(STRICT))
        .expect("fixture has a head");

    context.signals().mute();
    context
        .load_variant(&variant, WaitConfig::default())
        .await
        .expect("failed to load");
    tokio::time::sleep(Duration::from_millis(200)).await;
    context.signals().unmute();

    assert_contains_matching(context.signals(), CSP_VIOLATION).expect("violation captured");
    let violations = context.signals().of_kind(SignalKind::ConsoleError);
    assert!(
        violations.iter().any(|s| s.contains(CSP_VIOLATION)),
        "violation should be a console error: {violations:?}"
    );
    assert_eq!(context.observe("window.x").await.expect("observe"), None);

    drop(context);
    session.stop().await.expect("failed to stop");
}

#[tokio::test]
#[ignore]
async fn hashed_policy_lets_inline_script_run() {
    let session = Session::start(&SessionConfig::default())
        .await
        .expect("failed to launch");
    let context = session
        .new_context()
        .await
        .expect("failed to open context")
        .attach()
        .await
        .expect("failed to attach listeners");

    let variant = csp_harness::build_variant(&fixture(), &hashed_policy()).expect("fixture has a head");
    context
        .load_variant(&variant, WaitConfig::default())
        .await
        .expect("failed to load");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_empty(context.signals()).expect("no signals");
    let x: i64 = context.evaluate_as("window.x").await.expect("window.x");
    assert_eq!(x, 3);

    context.close().await.expect("failed to close context");
    session.stop().await.expect("failed to stop");
}

#[tokio::test]
#[ignore]
async fn violation_then_compliant_has_no_bleed_over() {
    let report = Suite::new(SuiteConfig::default())
        .scenario(strict_scenario())
        .scenario(hashed_scenario())
        .run()
        .await
        .expect("suite ran");

    assert!(report.is_success(), "{report:#?}");
    assert!(report.scenarios[1].signals.is_empty());
}

#[tokio::test]
#[ignore]
async fn compliant_then_violation_starts_from_a_fresh_window() {
    let report = Suite::new(SuiteConfig::default())
        .scenario(hashed_scenario())
        .scenario(strict_scenario())
        .run()
        .await
        .expect("suite ran");

    assert!(report.is_success(), "{report:#?}");
}

#[tokio::test]
#[ignore]
async fn uncaught_errors_and_console_errors_are_captured() {
    let fixture = FixtureDocument::new(
        "errors.html",
        r#"<!DOCTYPE html>
<html>
<head><title>errors</title></head>
<body>
<script>console.error("reported by page");</script>
<script>window.done = true; throw new Error("boom");</script>
</body>
</html>"#,
    );
    let scenario = Scenario::new(
        "page errors are signals too",
        fixture,
        PolicyDeclaration::literal("script-src 'unsafe-inline'"),
    )
    .settle(Settle::global_defined("done"))
    .expect_signal(SignalPattern::containing("reported by page").of_kind(SignalKind::ConsoleError))
    .expect_signal(SignalPattern::containing("boom").of_kind(SignalKind::UncaughtPageError))
    .muted();

    let report = Suite::new(SuiteConfig::default())
        .scenario(scenario)
        .run()
        .await
        .expect("suite ran");

    assert!(report.is_success(), "{report:#?}");
}

#[tokio::test]
#[ignore]
async fn viewport_is_applied() {
    let session = Session::start(&SessionConfig::new().with_viewport(800, 600))
        .await
        .expect("failed to launch");
    let context = session
        .new_context()
        .await
        .expect("failed to open context")
        .attach()
        .await
        .expect("failed to attach listeners");

    let width: i64 = context.evaluate_as("window.innerWidth").await.expect("width");
    let height: i64 = context.evaluate_as("window.innerHeight").await.expect("height");
    assert_eq!((width, height), (800, 600));

    drop(context);
    session.stop().await.expect("failed to stop");
}
