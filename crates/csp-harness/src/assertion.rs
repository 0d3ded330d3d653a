//! Declarative expectations over captured signals and page state.
//!
//! Matching is plain substring containment against each signal's message.
//! Kinds can optionally narrow a pattern; nothing here parses or interprets
//! the policy itself.

use crate::signal::{Signal, SignalBuffer, SignalKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Substring every engine uses in CSP violation reports.
pub const CSP_VIOLATION: &str = "violates the following Content Security Policy";

/// An expectation that did not hold.
///
/// Recoverable: the scenario fails, the suite moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("assertion failed: {message}")]
pub struct AssertionFailure {
    /// What was expected and what was seen instead
    pub message: String,
}

impl AssertionFailure {
    /// Creates a failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Matches signals by message substring and, optionally, kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPattern {
    /// Required substring of the message
    pub substring: String,
    /// Restrict to one signal kind
    #[serde(default)]
    pub kind: Option<SignalKind>,
}

impl SignalPattern {
    /// Matches any signal whose message contains `substring`.
    pub fn containing(substring: impl Into<String>) -> Self {
        Self {
            substring: substring.into(),
            kind: None,
        }
    }

    /// Matches a CSP violation report on the console.
    #[must_use]
    pub fn csp_violation() -> Self {
        Self::containing(CSP_VIOLATION).of_kind(SignalKind::ConsoleError)
    }

    /// Narrows the pattern to one kind.
    #[must_use]
    pub fn of_kind(mut self, kind: SignalKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Returns true if `signal` satisfies the pattern.
    #[must_use]
    pub fn matches(&self, signal: &Signal) -> bool {
        self.kind.is_none_or(|kind| kind == signal.kind) && signal.contains(&self.substring)
    }
}

impl fmt::Display for SignalPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind} containing {:?}", self.substring),
            None => write!(f, "signal containing {:?}", self.substring),
        }
    }
}

/// A predicate over a signal sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "expect")]
pub enum SignalExpectation {
    /// No signal at all was captured.
    Empty,
    /// At least one signal matches.
    Contains(SignalPattern),
    /// The first captured signal matches.
    ///
    /// Only meaningful when nothing else can be emitted before the signal
    /// of interest; prefer `Contains`.
    FirstMatches(SignalPattern),
    /// No signal matches.
    Absent(SignalPattern),
}

impl SignalExpectation {
    /// Evaluates the expectation against a signal sequence.
    ///
    /// # Errors
    ///
    /// Returns an `AssertionFailure` describing the mismatch.
    pub fn check(&self, signals: &[Signal]) -> Result<(), AssertionFailure> {
        match self {
            SignalExpectation::Empty => expect_empty(signals),
            SignalExpectation::Contains(pattern) => expect_contains(signals, pattern),
            SignalExpectation::FirstMatches(pattern) => expect_first(signals, pattern),
            SignalExpectation::Absent(pattern) => match signals.iter().find(|s| pattern.matches(s)) {
                None => Ok(()),
                Some(hit) => Err(AssertionFailure::new(format!(
                    "expected no {pattern}, but captured: {hit}"
                ))),
            },
        }
    }
}

/// Fails unless the buffer is empty.
///
/// # Errors
///
/// Returns an `AssertionFailure` listing what was captured.
pub fn assert_empty(buffer: &SignalBuffer) -> Result<(), AssertionFailure> {
    expect_empty(&buffer.snapshot())
}

/// Fails unless some captured signal's message contains `substring`.
///
/// # Errors
///
/// Returns an `AssertionFailure` listing what was captured.
pub fn assert_contains_matching(
    buffer: &SignalBuffer,
    substring: &str,
) -> Result<(), AssertionFailure> {
    expect_contains(&buffer.snapshot(), &SignalPattern::containing(substring))
}

/// Fails unless the first captured signal's message contains `substring`.
///
/// # Errors
///
/// Returns an `AssertionFailure` naming the actual first signal.
pub fn assert_first_matches(
    buffer: &SignalBuffer,
    substring: &str,
) -> Result<(), AssertionFailure> {
    expect_first(&buffer.snapshot(), &SignalPattern::containing(substring))
}

fn expect_empty(signals: &[Signal]) -> Result<(), AssertionFailure> {
    if signals.is_empty() {
        return Ok(());
    }
    Err(AssertionFailure::new(format!(
        "expected no signals, captured {}: {}",
        signals.len(),
        summarize(signals)
    )))
}

fn expect_contains(signals: &[Signal], pattern: &SignalPattern) -> Result<(), AssertionFailure> {
    if signals.iter().any(|s| pattern.matches(s)) {
        return Ok(());
    }
    Err(AssertionFailure::new(format!(
        "expected a {pattern}, captured {}: {}",
        signals.len(),
        summarize(signals)
    )))
}

fn expect_first(signals: &[Signal], pattern: &SignalPattern) -> Result<(), AssertionFailure> {
    match signals.first() {
        Some(first) if pattern.matches(first) => Ok(()),
        Some(first) => Err(AssertionFailure::new(format!(
            "expected first signal to be a {pattern}, was: {first}"
        ))),
        None => Err(AssertionFailure::new(format!(
            "expected first signal to be a {pattern}, captured none"
        ))),
    }
}

fn summarize(signals: &[Signal]) -> String {
    if signals.is_empty() {
        return "[]".to_string();
    }
    signals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> Signal {
        Signal::new(
            SignalKind::ConsoleError,
            "Refused to execute inline script because it violates the following Content Security Policy directive: \"default-src 'self' 'report-sample'\".",
        )
    }

    #[test]
    fn empty_expectation() {
        assert!(SignalExpectation::Empty.check(&[]).is_ok());

        let err = SignalExpectation::Empty.check(&[violation()]).unwrap_err();
        assert!(err.message.contains("captured 1"));
        assert!(err.message.contains("Refused to execute inline script"));
    }

    #[test]
    fn contains_finds_a_later_match() {
        let signals = [
            Signal::new(SignalKind::UncaughtPageError, "ReferenceError: foo is not defined"),
            violation(),
        ];

        assert!(SignalExpectation::Contains(SignalPattern::csp_violation())
            .check(&signals)
            .is_ok());
        assert!(SignalExpectation::FirstMatches(SignalPattern::csp_violation())
            .check(&signals)
            .is_err());
    }

    #[test]
    fn first_matches_on_empty_sequence_fails() {
        let err = SignalExpectation::FirstMatches(SignalPattern::containing("x"))
            .check(&[])
            .unwrap_err();
        assert!(err.message.contains("captured none"));
    }

    #[test]
    fn kind_narrows_the_match() {
        let page_error = Signal::new(SignalKind::UncaughtPageError, CSP_VIOLATION);
        assert!(!SignalPattern::csp_violation().matches(&page_error));
        assert!(SignalPattern::containing(CSP_VIOLATION).matches(&page_error));
    }

    #[test]
    fn absent_rejects_a_match() {
        let expectation = SignalExpectation::Absent(SignalPattern::csp_violation());
        assert!(expectation.check(&[]).is_ok());
        assert!(expectation.check(&[violation()]).is_err());
    }

    #[test]
    fn buffer_level_helpers() {
        let buffer = SignalBuffer::new();
        assert!(assert_empty(&buffer).is_ok());
        assert!(assert_contains_matching(&buffer, CSP_VIOLATION).is_err());

        buffer.push(violation());
        assert!(assert_empty(&buffer).is_err());
        assert!(assert_contains_matching(&buffer, CSP_VIOLATION).is_ok());
        assert!(assert_first_matches(&buffer, "Refused").is_ok());
    }

    #[test]
    fn expectations_deserialize_from_tagged_tables() {
        let contains: SignalExpectation = serde_json::from_value(serde_json::json!({
            "expect": "contains",
            "substring": "violates",
            "kind": "ConsoleError",
        }))
        .unwrap();
        assert_eq!(
            contains,
            SignalExpectation::Contains(
                SignalPattern::containing("violates").of_kind(SignalKind::ConsoleError)
            )
        );

        let empty: SignalExpectation =
            serde_json::from_value(serde_json::json!({ "expect": "empty" })).unwrap();
        assert_eq!(empty, SignalExpectation::Empty);
    }
}
