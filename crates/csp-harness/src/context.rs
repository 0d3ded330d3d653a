//! Browsing contexts: one tab, its signal listeners, and document loading.
//!
//! A freshly opened [`BrowsingContext`] cannot load anything. It must first
//! be turned into an [`ObservedContext`] by [`BrowsingContext::attach`],
//! which registers every diagnostic listener and waits for the registrations
//! to be acknowledged. Only then can a document be loaded, so no violation
//! emitted during load can slip past the collector.
//!
//! Before each load the previous document is retired and the listener task
//! is fenced: events still queued from that document are attributed to the
//! buffer generation they were raised in, and dropped if it has been reset.

use crate::document::DocumentVariant;
use crate::error::{HarnessError, Result};
use crate::signal::{
    classify_console, classify_exception, classify_log_entry, context_crashed, SignalBuffer,
};
use crate::wait::{wait_for_result, WaitConfig};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::inspector::{self, EventTargetCrashed};
use chromiumoxide::cdp::browser_protocol::log::{self, EventEntryAdded};
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::page::Page as ChromePage;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Blank document used to retire the previous one before a load.
const BLANK: &str = "about:blank";

/// What a scenario needs from the context it runs in.
///
/// [`ObservedContext`] is the real implementation; the seam exists so the
/// scenario runner can be driven without a browser.
#[async_trait]
pub trait ScenarioHost: Send + Sync {
    /// The buffer the context's listeners append to.
    fn signals(&self) -> &SignalBuffer;

    /// Replaces the current document with `variant` and waits until it
    /// reports ready.
    async fn load(&self, variant: &DocumentVariant) -> Result<()>;

    /// Evaluates an expression and returns its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Reads a page expression, `None` if it is undefined.
    ///
    /// A `ReferenceError` (an undeclared global) also reads as `None`.
    async fn observe(&self, expression: &str) -> Result<Option<Value>>;
}

/// A browser tab with no listeners attached yet.
#[derive(Debug)]
pub struct BrowsingContext {
    inner: ChromePage,
}

impl BrowsingContext {
    pub(crate) fn new(page: ChromePage) -> Self {
        Self { inner: page }
    }

    /// Registers the signal listeners, exactly once for this context.
    ///
    /// Listener registration is awaited before returning; the returned
    /// context is the only handle that can load documents.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if a listener or domain cannot be enabled.
    pub async fn attach(self) -> Result<ObservedContext> {
        let page = self.inner;
        let signals = SignalBuffer::new();

        let console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(|e| HarnessError::ConnectionFailed(e.to_string()))?;
        let log_entries = page
            .event_listener::<EventEntryAdded>()
            .await
            .map_err(|e| HarnessError::ConnectionFailed(e.to_string()))?;
        let exceptions = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(|e| HarnessError::ConnectionFailed(e.to_string()))?;
        let crashes = page
            .event_listener::<EventTargetCrashed>()
            .await
            .map_err(|e| HarnessError::ConnectionFailed(e.to_string()))?;

        // Violation reports come through the Log domain.
        page.execute(log::EnableParams::default())
            .await
            .map_err(|e| HarnessError::ConnectionFailed(e.to_string()))?;
        page.execute(inspector::EnableParams::default())
            .await
            .map_err(|e| HarnessError::ConnectionFailed(e.to_string()))?;

        let streams: Vec<BoxStream<'static, Option<_>>> = vec![
            console.map(|event| classify_console(&event)).boxed(),
            log_entries.map(|event| classify_log_entry(&event)).boxed(),
            exceptions
                .map(|event| Some(classify_exception(&event)))
                .boxed(),
            crashes.map(|_| Some(context_crashed())).boxed(),
        ];

        let sink = signals.clone();
        let (fences, mut fence_rx) = mpsc::unbounded_channel::<Fence>();
        let listener = tokio::spawn(async move {
            let mut events = stream::select_all(streams);
            let mut generation = sink.generation();
            loop {
                tokio::select! {
                    biased;
                    event = events.next() => match event {
                        Some(Some(signal)) => {
                            sink.push_for(generation, signal);
                        }
                        Some(None) => {}
                        None => break,
                    },
                    fence = fence_rx.recv() => {
                        let Some(fence) = fence else { break };
                        // Whatever is already queued was raised before the fence.
                        while let Some(Some(event)) = events.next().now_or_never() {
                            if let Some(signal) = event {
                                sink.push_for(generation, signal);
                            }
                        }
                        generation = fence.generation;
                        if fence.done.send(()).is_err() {
                            debug!("fence waiter went away");
                        }
                    }
                }
            }
            debug!("signal listeners finished");
        });

        debug!("signal listeners attached");

        Ok(ObservedContext {
            inner: page,
            signals,
            fences,
            listener,
        })
    }
}

/// A browser tab whose diagnostic channels are being captured.
#[derive(Debug)]
pub struct ObservedContext {
    inner: ChromePage,
    signals: SignalBuffer,
    fences: mpsc::UnboundedSender<Fence>,
    listener: JoinHandle<()>,
}

/// Moves the listener task on to a new buffer generation.
#[derive(Debug)]
struct Fence {
    generation: u64,
    done: oneshot::Sender<()>,
}

#[derive(Debug, Deserialize)]
struct PageValue {
    defined: bool,
    value: Value,
}

impl ObservedContext {
    /// Returns the signal buffer fed by this context's listeners.
    #[must_use]
    pub fn signals(&self) -> &SignalBuffer {
        &self.signals
    }

    /// Waits until `document.readyState` is `"complete"`.
    ///
    /// # Errors
    ///
    /// Returns `WaitTimeout` if the document never completes, or
    /// `ContextCrashed` if the renderer dies while loading.
    pub async fn wait_for_load(&self, config: WaitConfig) -> Result<()> {
        wait_for_result(
            || {
                let page = self.inner.clone();
                let signals = self.signals.clone();
                async move {
                    if let Some(crash) = signals.crash() {
                        return Err(HarnessError::ContextCrashed(crash.message));
                    }
                    let result = page
                        .evaluate("document.readyState")
                        .await
                        .map_err(|e| HarnessError::from_cdp(e, HarnessError::ScriptExecutionFailed))?;

                    Ok(result
                        .value()
                        .and_then(Value::as_str)
                        .is_some_and(|s| s == "complete"))
                }
            },
            config,
            "document ready",
        )
        .await
    }

    /// Loads a document variant, replacing the current document entirely.
    ///
    /// Navigation to a `data:` URL gives every variant a fresh window, so
    /// globals set by a previous scenario are gone.
    ///
    /// The previous document is first replaced by a blank one so nothing it
    /// raises can be attributed to the new variant.
    ///
    /// # Errors
    ///
    /// Returns `LoadFailed` if navigation fails, or `WaitTimeout` if the
    /// document never reports ready. Losing the engine surfaces as a
    /// suite-fatal error.
    pub async fn load_variant(&self, variant: &DocumentVariant, config: WaitConfig) -> Result<()> {
        let document = variant.fixture_name();
        let load_failed = |reason| HarnessError::LoadFailed {
            document: document.to_string(),
            reason,
        };

        self.inner
            .goto(BLANK)
            .await
            .map_err(|e| HarnessError::from_cdp(e, load_failed))?;
        self.fence().await?;

        let url = variant.to_data_url();
        debug!(
            fixture = document,
            bytes = variant.as_str().len(),
            "loading document variant"
        );

        self.inner
            .goto(url.as_str())
            .await
            .map_err(|e| HarnessError::from_cdp(e, load_failed))?;

        self.wait_for_load(config).await
    }

    /// Waits until the listener task has drained everything queued so far
    /// and attributes further events to the buffer's current generation.
    async fn fence(&self) -> Result<()> {
        let stopped = || HarnessError::ConnectionFailed("signal listeners stopped".into());
        let (done, acked) = oneshot::channel();
        self.fences
            .send(Fence {
                generation: self.signals.generation(),
                done,
            })
            .map_err(|_| stopped())?;
        acked.await.map_err(|_| stopped())
    }

    /// Executes JavaScript in the page and deserializes the result.
    ///
    /// # Errors
    ///
    /// Returns `ScriptExecutionFailed` if evaluation throws or the result
    /// does not deserialize into `T`. Losing the engine surfaces as a
    /// suite-fatal error.
    pub async fn evaluate_as<T>(&self, script: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let result = self
            .inner
            .evaluate(script)
            .await
            .map_err(|e| HarnessError::from_cdp(e, HarnessError::ScriptExecutionFailed))?;

        result
            .into_value()
            .map_err(|e| HarnessError::ScriptExecutionFailed(e.to_string()))
    }

    /// Detaches the listeners and closes the tab.
    ///
    /// # Errors
    ///
    /// Returns an error if the tab fails to close.
    pub async fn close(self) -> Result<()> {
        self.listener.abort();
        self.inner.clone().close().await?;
        Ok(())
    }
}

#[async_trait]
impl ScenarioHost for ObservedContext {
    fn signals(&self) -> &SignalBuffer {
        &self.signals
    }

    async fn load(&self, variant: &DocumentVariant) -> Result<()> {
        self.load_variant(variant, WaitConfig::default()).await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.evaluate_as(expression).await
    }

    async fn observe(&self, expression: &str) -> Result<Option<Value>> {
        let page_value: PageValue = self.evaluate_as(&observe_script(expression)).await?;
        Ok(page_value.defined.then_some(page_value.value))
    }
}

impl Drop for ObservedContext {
    fn drop(&mut self) {
        if !self.listener.is_finished() {
            self.listener.abort();
        }
    }
}

/// Wraps an expression so undefined and undeclared read as "not defined"
/// instead of failing the evaluation.
fn observe_script(expression: &str) -> String {
    format!(
        "(() => {{ \
           try {{ \
             const v = ({expression}); \
             return {{ defined: typeof v !== 'undefined', value: v === undefined ? null : v }}; \
           }} catch (e) {{ \
             if (e instanceof ReferenceError) {{ return {{ defined: false, value: null }}; }} \
             throw e; \
           }} \
         }})()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_script_wraps_the_expression() {
        let script = observe_script("window.x");
        assert!(script.contains("const v = (window.x);"));
        assert!(script.contains("ReferenceError"));
        assert!(script.starts_with("(() => {"));
        assert!(script.ends_with("})()"));
    }

    #[test]
    fn page_value_reads_undefined_as_none() {
        let undefined: PageValue =
            serde_json::from_value(serde_json::json!({ "defined": false, "value": null })).unwrap();
        assert_eq!(undefined.defined.then_some(undefined.value), None);

        let three: PageValue =
            serde_json::from_value(serde_json::json!({ "defined": true, "value": 3 })).unwrap();
        assert_eq!(three.defined.then_some(three.value), Some(serde_json::json!(3)));
    }
}
