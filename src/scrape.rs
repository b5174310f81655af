//! End-to-end extraction pipeline.
//!
//! One call, one browser session: acquire, navigate, extract, release. The
//! session is released on every path — success, navigation failure, and
//! cancellation (the session's drop handling covers a request future that
//! is dropped mid-flight).

use std::time::Duration;

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::extract::{ExtractionRequest, ExtractionResult, extract_menu};
use crate::logging::ScrapeLogger;
use crate::navigate::{NavigationOutcome, navigate, wait_for_ready};
use crate::selectors::SelectorConfig;
use crate::session::BrowserSession;

/// Extract a restaurant's menu from the requested page.
///
/// Navigation-level problems abort before any extraction and map onto the
/// [`ScrapeError`] taxonomy; extraction-level trouble is confined to
/// warnings on the (successful) result.
pub async fn run(
    request: &ExtractionRequest,
    selectors: &SelectorConfig,
    config: &ScrapeConfig,
    logger: &ScrapeLogger,
) -> Result<ExtractionResult, ScrapeError> {
    let session = BrowserSession::launch(config, logger)
        .await
        .map_err(|err| ScrapeError::Launch(err.to_string()))?;

    let outcome = drive(&session, request, selectors, config, logger).await;

    session.release(logger).await;
    outcome
}

async fn drive(
    session: &BrowserSession,
    request: &ExtractionRequest,
    selectors: &SelectorConfig,
    config: &ScrapeConfig,
    logger: &ScrapeLogger,
) -> Result<ExtractionResult, ScrapeError> {
    let url = &request.target_url;

    match navigate(session.page(), url, config.navigation_timeout_ms, logger).await {
        NavigationOutcome::Timeout => Err(ScrapeError::Timeout {
            url: url.clone(),
            timeout_ms: config.navigation_timeout_ms,
        }),
        NavigationOutcome::NoResponse(reason) => Err(ScrapeError::Transport {
            url: url.clone(),
            reason,
        }),
        NavigationOutcome::HttpError(status) => Err(ScrapeError::HttpStatus {
            url: url.clone(),
            status,
        }),
        NavigationOutcome::Loaded(status) => {
            logger.info(
                format!("loaded {url} (HTTP {status})"),
                Some("navigate"),
                None,
            );

            wait_for_ready(
                session.page(),
                config.dom_settle_timeout_ms,
                config.settle_delay_ms,
                logger,
            )
            .await;

            let query_timeout = Duration::from_millis(config.query_timeout_ms);
            Ok(extract_menu(session.page(), request, selectors, query_timeout, logger).await)
        }
    }
}
