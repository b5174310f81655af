//! Browser session lifecycle.
//!
//! Each extraction request gets its own Chromium instance with a single
//! isolated page: no state leaks between requests and no pooling to reason
//! about. The session owns the CDP event-loop task and guarantees teardown
//! on every exit path; dropping the session (including when the owning
//! request future is cancelled) aborts the event loop and lets chromiumoxide
//! kill the child process.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ScrapeConfig;
use crate::logging::ScrapeLogger;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not launch chromium: {0}")]
    Launch(String),
    #[error("could not open a browsing context: {0}")]
    Context(String),
}

/// One headless browser plus one page, scoped to a single request.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession").finish_non_exhaustive()
    }
}

impl BrowserSession {
    /// Launch a fresh browser and open an isolated blank page.
    ///
    /// A launch failure is an environment problem (missing binary, broken
    /// sandbox) and is surfaced as-is rather than retried.
    pub async fn launch(config: &ScrapeConfig, logger: &ScrapeLogger) -> Result<Self, SessionError> {
        let browser_config = build_browser_config(config)?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;

        let handler = spawn_event_loop(handler);

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                // Partial launch: tear down what exists before reporting.
                handler.abort();
                drop(browser);
                return Err(SessionError::Context(err.to_string()));
            }
        };

        logger.debug("browser session launched", Some("session"), None);

        Ok(Self {
            browser,
            handler,
            page,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the browser gracefully. Runs unconditionally at the end of a
    /// request, whatever the extraction outcome was; failures here are
    /// logged and swallowed since there is nothing left to salvage.
    pub async fn release(mut self, logger: &ScrapeLogger) {
        if let Err(err) = self.browser.close().await {
            logger.warn(
                format!("browser close failed: {err}"),
                Some("session"),
                None,
            );
        }
        if let Err(err) = self.browser.wait().await {
            logger.debug(
                format!("browser did not exit cleanly: {err}"),
                Some("session"),
                None,
            );
        }
        logger.debug("browser session released", Some("session"), None);
        // Drop aborts the event-loop task.
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Covers cancellation and error paths that never reach `release`;
        // dropping `browser` kills the child process.
        self.handler.abort();
    }
}

fn build_browser_config(config: &ScrapeConfig) -> Result<BrowserConfig, SessionError> {
    let viewport = Viewport {
        width: config.viewport_width,
        height: config.viewport_height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: config.viewport_width >= config.viewport_height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder()
        .viewport(viewport)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-dev-shm-usage");

    if let Some(path) = &config.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    if let Some(user_agent) = &config.user_agent {
        builder = builder.arg(format!("--user-agent={user_agent}"));
    }

    let builder = if config.headless {
        builder
    } else {
        builder.with_head()
    };

    builder.build().map_err(SessionError::Launch)
}

fn spawn_event_loop(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if result.is_err() {
                // The event loop ends when the browser goes away; nothing
                // actionable remains at this point.
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Verbosity;

    #[tokio::test]
    async fn launch_with_bogus_executable_reports_launch_failure() {
        let mut config = ScrapeConfig::default();
        config.chrome_executable = Some("/nonexistent/path/to/chromium".into());

        let logger = ScrapeLogger::new(Verbosity::Minimal);
        let err = BrowserSession::launch(&config, &logger)
            .await
            .expect_err("launch should fail");
        assert!(matches!(err, SessionError::Launch(_)));
    }

    #[test]
    fn browser_config_reflects_headless_and_user_agent() {
        let mut config = ScrapeConfig::default();
        config.user_agent = Some("menucard-test/1".to_string());
        // Only asserting that construction succeeds with every option set;
        // chromiumoxide keeps the resulting config opaque.
        assert!(build_browser_config(&config).is_ok());

        config.headless = false;
        assert!(build_browser_config(&config).is_ok());
    }
}
