//! Diagnostic signal capture.
//!
//! The engine reports policy violations asynchronously, over three channels:
//! console/log entries, uncaught in-page exceptions, and target-level errors
//! (a crashed renderer). Each inbound event is classified into a [`Signal`]
//! and appended, unfiltered, to the [`SignalBuffer`] owned by the observed
//! context. Filtering only happens later, in the assertion layer, so the raw
//! evidence stays available when a scenario fails.
//!
//! # Design Rationale
//!
//! We use a shared `Arc<Mutex<..>>` buffer instead of channels because:
//! 1. Assertions need to read the accumulated signals more than once
//! 2. Emission order must be preserved
//! 3. Listener tasks and the scenario runner live on different tokio tasks
//!
//! # Generations
//!
//! Events are delivered asynchronously, so a signal raised by one scenario's
//! document can reach the buffer after the next scenario has reset it. Every
//! reset starts a new generation, and appends carry the generation their
//! event belongs to. Appends from an older generation are dropped.

use chromiumoxide::cdp::browser_protocol::log::{EventEntryAdded, LogEntryLevel};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, warn};

/// The channel a signal was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// An `error`-typed console message, including engine log entries such
    /// as CSP violation reports.
    ConsoleError,
    /// An exception thrown by page script and not caught.
    UncaughtPageError,
    /// An error at the browsing-context level (e.g. the renderer crashed).
    ContextError,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::ConsoleError => "console error",
            SignalKind::UncaughtPageError => "page error",
            SignalKind::ContextError => "context error",
        };
        f.write_str(name)
    }
}

/// One observed diagnostic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Which channel delivered it
    pub kind: SignalKind,

    /// The message text as reported by the engine.
    pub message: String,

    /// When the harness captured it (system time, not page time).
    pub timestamp: SystemTime,

    /// Source location if available (e.g., "data:text/html,...:4:12").
    pub source: Option<String>,
}

impl Signal {
    /// Creates a new signal.
    #[must_use]
    pub fn new(kind: SignalKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: SystemTime::now(),
            source: None,
        }
    }

    /// Attaches a source location.
    #[must_use]
    pub fn with_source(mut self, source: String) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns true if the message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.message.contains(needle)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Ordered, append-only signal accumulator for the current scenario.
///
/// Cheaply cloneable; clones share the same storage. Only the collector's
/// listeners append; the scenario runner clears it between scenarios.
///
/// Muting suppresses re-emission of captured signals to the tracing log but
/// never drops capture. Scenarios that expect violations mute so the expected
/// errors do not read as failures in the diagnostic output.
#[derive(Debug, Clone, Default)]
pub struct SignalBuffer {
    capture: Arc<Mutex<Capture>>,
    muted: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct Capture {
    generation: u64,
    signals: Vec<Signal>,
}

impl SignalBuffer {
    /// Creates a new, empty, unmuted buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Capture> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current generation. It advances on every [`reset`].
    ///
    /// [`reset`]: SignalBuffer::reset
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Appends a signal to the current generation.
    #[cfg(test)]
    pub(crate) fn push(&self, signal: Signal) {
        let generation = self.generation();
        self.push_for(generation, signal);
    }

    /// Appends a signal raised during `generation` and re-emits it to the
    /// log unless muted. Returns false if the signal was dropped because the
    /// buffer has been reset since.
    ///
    /// If the mutex is poisoned the signal is still recorded.
    pub(crate) fn push_for(&self, generation: u64, signal: Signal) -> bool {
        let mut capture = self.lock();
        if capture.generation != generation {
            debug!(
                kind = %signal.kind,
                stale = generation,
                current = capture.generation,
                "dropping signal from a previous document"
            );
            return false;
        }
        if !self.is_muted() {
            warn!(
                target: "csp_harness::page",
                kind = %signal.kind,
                source = signal.source.as_deref().unwrap_or(""),
                "{}",
                signal.message
            );
        }
        capture.signals.push(signal);
        true
    }

    /// Clears captured signals and starts a new generation.
    ///
    /// Called at the start of every scenario. Mute state is reset too, so a
    /// scenario that forgot to unmute cannot silence the next one.
    pub fn reset(&self) {
        let mut capture = self.lock();
        capture.signals.clear();
        capture.generation += 1;
        drop(capture);
        self.unmute();
    }

    /// Suppresses re-emission to the log. Capture continues.
    pub fn mute(&self) {
        self.muted.store(true, Ordering::SeqCst);
    }

    /// Re-enables re-emission to the log.
    pub fn unmute(&self) {
        self.muted.store(false, Ordering::SeqCst);
    }

    /// Returns true while re-emission is suppressed.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Returns all captured signals, in emission order, as a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Signal> {
        self.lock().signals.clone()
    }

    /// Returns captured signals of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: SignalKind) -> Vec<Signal> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.kind == kind)
            .collect()
    }

    /// Returns the first context-level error, if the renderer went away.
    #[must_use]
    pub fn crash(&self) -> Option<Signal> {
        self.lock()
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::ContextError)
            .cloned()
    }

    /// Returns the number of captured signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().signals.len()
    }

    /// Returns true if nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classifies a `Runtime.consoleAPICalled` event.
///
/// Only `console.error` calls are violation-relevant; everything else is
/// ignored.
pub(crate) fn classify_console(event: &EventConsoleApiCalled) -> Option<Signal> {
    if !is_error_call(&event.r#type) {
        return None;
    }

    let text = event
        .args
        .iter()
        .map(format_remote_object)
        .collect::<Vec<_>>()
        .join(" ");

    let mut signal = Signal::new(SignalKind::ConsoleError, text);

    if let Some(frame) = event
        .stack_trace
        .as_ref()
        .and_then(|trace| trace.call_frames.first())
    {
        signal = signal.with_source(format!(
            "{}:{}:{}",
            frame.url, frame.line_number, frame.column_number
        ));
    }

    Some(signal)
}

/// Classifies a `Log.entryAdded` event.
///
/// CSP violations are reported by the engine itself through this channel
/// rather than through `console.*`, so error-level entries count as console
/// errors.
pub(crate) fn classify_log_entry(event: &EventEntryAdded) -> Option<Signal> {
    let entry = &event.entry;
    if !is_error_entry(&entry.level) {
        return None;
    }

    let mut signal = Signal::new(SignalKind::ConsoleError, entry.text.clone());
    if let Some(url) = &entry.url {
        let line = entry.line_number.unwrap_or_default();
        signal = signal.with_source(format!("{url}:{line}"));
    }
    Some(signal)
}

/// Classifies a `Runtime.exceptionThrown` event.
pub(crate) fn classify_exception(event: &EventExceptionThrown) -> Signal {
    let details = &event.exception_details;

    // The description carries "Name: message" plus the stack; the bare text
    // is usually just "Uncaught".
    let message = details
        .exception
        .as_ref()
        .and_then(|e| e.description.clone())
        .unwrap_or_else(|| details.text.clone());

    let mut signal = Signal::new(SignalKind::UncaughtPageError, message);
    if let Some(url) = &details.url {
        signal = signal.with_source(format!(
            "{url}:{}:{}",
            details.line_number, details.column_number
        ));
    }
    signal
}

/// Builds the signal for a crashed target.
pub(crate) fn context_crashed() -> Signal {
    Signal::new(SignalKind::ContextError, "Page crashed!")
}

fn is_error_call(kind: &ConsoleApiCalledType) -> bool {
    matches!(kind, ConsoleApiCalledType::Error)
}

fn is_error_entry(level: &LogEntryLevel) -> bool {
    matches!(level, LogEntryLevel::Error)
}

fn format_remote_object(arg: &RemoteObject) -> String {
    format_remote_value(arg.value.as_ref(), arg.description.as_deref())
}

/// Renders one console argument the way a console would print it.
fn format_remote_value(value: Option<&serde_json::Value>, description: Option<&str>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => description.unwrap_or("<object>").to_string(),
    }
}
