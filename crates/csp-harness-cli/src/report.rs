//! Suite report rendering: a terse human summary or JSON.

use csp_harness::{ScenarioOutcome, SuiteReport};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Renders the human-readable summary.
///
/// Failing scenarios list their phase, reason, and every captured signal.
pub fn render(report: &SuiteReport, color: bool) -> String {
    let mut lines = Vec::new();

    for scenario in &report.scenarios {
        let took = format_duration(scenario.duration);
        match &scenario.outcome {
            ScenarioOutcome::Pass => {
                lines.push(format!("{} {} ({took})", badge("PASS", true, color), scenario.name));
            }
            ScenarioOutcome::Fail { phase, message } => {
                lines.push(format!("{} {} ({took})", badge("FAIL", false, color), scenario.name));
                lines.push(format!("     while {phase}: {message}"));
                lines.extend(scenario.signals.iter().map(|signal| format!("     {signal}")));
            }
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "{} scenarios: {} passed, {} failed ({})",
        report.scenarios.len(),
        report.passed(),
        report.failed(),
        format_duration(report.duration)
    ));
    lines.join("\n")
}

/// Serializes the report as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(report: &SuiteReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn badge(label: &str, pass: bool, color: bool) -> String {
    match (color, pass) {
        (false, _) => label.to_string(),
        (true, true) => label.green().bold().to_string(),
        (true, false) => label.red().bold().to_string(),
    }
}

/// Format a duration as `ms`, seconds, or minutes and seconds.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{total_ms}ms")
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csp_harness::{ScenarioPhase, ScenarioReport, Signal, SignalKind};

    fn report() -> SuiteReport {
        SuiteReport {
            scenarios: vec![
                ScenarioReport {
                    name: "strict".into(),
                    outcome: ScenarioOutcome::Pass,
                    signals: vec![Signal::new(SignalKind::ConsoleError, "Refused to execute")],
                    duration: Duration::from_millis(120),
                },
                ScenarioReport {
                    name: "hashed".into(),
                    outcome: ScenarioOutcome::Fail {
                        phase: ScenarioPhase::Asserting,
                        message: "assertion failed: expected no signals".into(),
                    },
                    signals: vec![Signal::new(SignalKind::UncaughtPageError, "boom")],
                    duration: Duration::from_millis(1500),
                },
            ],
            duration: Duration::from_secs(2),
        }
    }

    #[test]
    fn plain_summary_lists_failures_with_signals() {
        let text = render(&report(), false);
        assert!(text.contains("PASS strict (120ms)"));
        assert!(text.contains("FAIL hashed (1.50s)"));
        assert!(text.contains("expected no signals"));
        assert!(text.contains("boom"));
        assert!(!text.contains("Refused"), "passing scenarios stay terse");
        assert!(text.ends_with("2 scenarios: 1 passed, 1 failed (2.00s)"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn plain_summary_layout() {
        let expected = "\
PASS strict (120ms)
FAIL hashed (1.50s)
     while asserting: assertion failed: expected no signals
     [page error] boom

2 scenarios: 1 passed, 1 failed (2.00s)";
        assert_eq!(render(&report(), false), expected);

        let empty = SuiteReport {
            scenarios: Vec::new(),
            duration: Duration::from_millis(3),
        };
        assert_eq!(render(&empty, false), "\n0 scenarios: 0 passed, 0 failed (3ms)");
    }

    #[test]
    fn json_report_is_tagged() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&report()).unwrap()).unwrap();
        assert_eq!(json["scenarios"][0]["outcome"]["outcome"], "pass");
        assert_eq!(json["scenarios"][1]["outcome"]["outcome"], "fail");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(5)), "5ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
