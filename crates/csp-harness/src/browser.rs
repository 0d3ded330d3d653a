//! Browser session lifecycle and process control.
//!
//! A [`Session`] owns one Chrome process for a whole suite. Launching is the
//! expensive part, so it happens once; scenarios then share the session's
//! single browsing context and rely on full-document replacement between
//! them.
//!
//! # Resource Safety
//!
//! `Session::stop` consumes the session, so it can only be called once.
//! If a session is dropped without being stopped (a panic mid-suite),
//! chromiumoxide's `Browser` drop kills the process.

use crate::context::{BrowsingContext, ObservedContext, ScenarioHost};
use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport as ChromeViewport;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default page viewport.
pub const DEFAULT_VIEWPORT: Viewport = Viewport {
    width: 1280,
    height: 720,
};

/// Default timeout for individual CDP requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        DEFAULT_VIEWPORT
    }
}

/// Configuration for launching a browser session.
///
/// Provides sensible defaults for headless testing with options
/// to customize for debugging or CI environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Run in headless mode (default: true unless the `visible` feature is on).
    pub headless: bool,

    /// Page viewport (default: 1280x720).
    pub viewport: Viewport,

    /// Extra Chrome arguments, kept unique and in insertion order.
    pub sandbox_args: Vec<String>,

    /// Chrome executable path (None = auto-detect).
    pub chrome_path: Option<PathBuf>,

    /// Open `DevTools` for every tab. Implies a visible browser.
    pub devtools: bool,

    /// Timeout for individual CDP requests.
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Creates a new config with defaults for headless testing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables visible mode for debugging.
    #[must_use]
    pub fn visible(mut self) -> Self {
        self.headless = false;
        self
    }

    /// Opens `DevTools` alongside each tab and shows the browser.
    #[must_use]
    pub fn with_devtools(mut self) -> Self {
        self.devtools = true;
        self.headless = false;
        self
    }

    /// Sets a custom viewport size.
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    /// Adds Chrome arguments, skipping ones already present.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            let arg = arg.into();
            if !self.sandbox_args.contains(&arg) {
                self.sandbox_args.push(arg);
            }
        }
        self
    }

    /// Uses a specific Chrome executable.
    #[must_use]
    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Converts to chromiumoxide `BrowserConfig`.
    ///
    /// Returns the config and the per-session profile directory it points at.
    fn to_browser_config(&self) -> Result<(BrowserConfig, PathBuf)> {
        let mut config = BrowserConfig::builder()
            .viewport(ChromeViewport {
                width: self.viewport.width,
                height: self.viewport.height,
                ..ChromeViewport::default()
            })
            .window_size(self.viewport.width, self.viewport.height)
            .request_timeout(self.request_timeout);

        if !self.headless {
            config = config.with_head();
        }

        if self.devtools {
            config = config.arg("--auto-open-devtools-for-tabs");
        }

        // A unique profile per session avoids ProcessSingleton conflicts
        // between suites running in parallel.
        let user_data_dir =
            std::env::temp_dir().join(format!("csp-harness-{}", uuid::Uuid::new_v4()));
        config = config.user_data_dir(&user_data_dir);

        for arg in &self.sandbox_args {
            config = config.arg(arg.clone());
        }

        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path);
        }

        let config = config.build().map_err(|e| HarnessError::LaunchFailed {
            reason: format!("invalid browser configuration: {e}"),
            source: None,
        })?;

        Ok((config, user_data_dir))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: !cfg!(feature = "visible"),
            viewport: DEFAULT_VIEWPORT,
            sandbox_args: vec![
                // Security Note: --no-sandbox disables Chrome's security sandbox.
                // Required when user namespaces are unavailable (common in CI
                // containers). Fixtures are trusted test documents.
                "--no-sandbox".to_string(),
                // Prevents /dev/shm exhaustion in containerized environments
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
            devtools: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Launches and tears down whatever hosts the scenarios.
///
/// [`Session`] is the real implementation.
#[async_trait]
pub trait Engine: Send + Sync + Sized {
    /// The context type scenarios run in.
    type Host: ScenarioHost;

    /// Opens a context with its signal listeners attached.
    async fn open_context(&self) -> Result<Self::Host>;

    /// Tears the engine down. Consumes it, so it runs at most once.
    async fn stop(self) -> Result<()>;
}

/// A running Chrome process driven over CDP.
pub struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
}

impl Session {
    /// Launches Chrome with the given configuration.
    ///
    /// Failure here is fatal for a suite and is not retried.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if Chrome is missing, not executable, or fails
    /// to start.
    pub async fn start(config: &SessionConfig) -> Result<Self> {
        debug!("Launching browser with config: {:?}", config);

        let (browser_config, user_data_dir) = config.to_browser_config()?;

        let (browser, mut handler) =
            Browser::launch(browser_config)
                .await
                .map_err(|e| HarnessError::LaunchFailed {
                    reason: "failed to launch Chrome process".to_string(),
                    source: Some(Box::new(e)),
                })?;

        // chromiumoxide only processes CDP traffic while its handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        info!(
            headless = config.headless,
            width = config.viewport.width,
            height = config.viewport.height,
            "browser launched"
        );

        Ok(Self {
            browser,
            handler,
            user_data_dir,
        })
    }

    /// Opens a new tab with no listeners attached.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the tab cannot be created.
    pub async fn new_context(&self) -> Result<BrowsingContext> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarnessError::ConnectionFailed(e.to_string()))?;

        Ok(BrowsingContext::new(page))
    }

    /// Closes the browser and waits for the process to exit.
    ///
    /// Falls back to killing the process if a graceful close fails. The
    /// per-session profile directory is removed either way.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the browser could not be closed
    /// gracefully (the process is still killed).
    pub async fn stop(mut self) -> Result<()> {
        let mut outcome = Ok(());

        debug!("Closing browser gracefully");
        if let Err(e) = self.browser.close().await {
            warn!("graceful close failed, killing browser: {}", e);
            if let Some(Err(kill)) = self.browser.kill().await {
                warn!("failed to kill browser: {}", kill);
            }
            outcome = Err(HarnessError::ConnectionFailed(e.to_string()));
        }
        if let Err(e) = self.browser.wait().await {
            warn!("failed to reap browser process: {}", e);
        }

        self.handler.abort();

        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(
                "could not remove profile dir {}: {}",
                self.user_data_dir.display(),
                e
            );
        }

        info!("browser stopped");
        outcome
    }
}

#[async_trait]
impl Engine for Session {
    type Host = ObservedContext;

    async fn open_context(&self) -> Result<ObservedContext> {
        self.new_context().await?.attach().await
    }

    async fn stop(self) -> Result<()> {
        Session::stop(self).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_data_dir", &self.user_data_dir)
            .finish_non_exhaustive()
    }
}
