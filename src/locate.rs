//! Multi-strategy element location.
//!
//! The target page's markup is not ours and drifts without notice, so a
//! single selector is never trusted. [`locate_first`] walks a
//! [`SelectorSet`] in priority order and stops at the first selector that
//! matches at least one element; matches from different selectors are never
//! merged, since mixing DOM shapes from different layout generations
//! produces garbage pairings downstream.
//!
//! Location is expressed against the [`DomScope`]/[`DomNode`] seam rather
//! than concrete browser types, so the extraction logic can be exercised
//! against in-memory documents in tests. The production implementations
//! delegate to chromiumoxide's `Page` and `Element`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::time;

use crate::logging::ScrapeLogger;
use crate::selectors::SelectorSet;

/// Failure of a single element query. Always scoped to one selector
/// attempt; the locator treats it as "no match" and moves on.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("element query failed: {0}")]
    Backend(String),
    #[error("element text unavailable: {0}")]
    Text(String),
}

/// Anything that CSS queries can be run against: the whole document or a
/// single element subtree.
#[async_trait]
pub trait DomScope: Send + Sync {
    type Node: DomNode;

    /// All elements matching `selector` within this scope. An empty vector
    /// means "selector is fine, nothing matched"; `Err` means the query
    /// itself failed (malformed selector, dead target).
    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, QueryError>;
}

/// A located element: a query scope of its own (for container-scoped
/// sub-queries) that can also yield its rendered text.
#[async_trait]
pub trait DomNode: DomScope<Node = Self> + Sized {
    async fn text(&self) -> Result<Option<String>, QueryError>;
}

/// Try each selector of `set` in order against `scope`; return the match
/// set of the first selector that yields at least one element.
///
/// Selector errors and per-query timeouts are logged as warnings and
/// treated as "no match". Returns `None` when the whole set is exhausted;
/// the caller decides the fallback.
pub async fn locate_first<S: DomScope>(
    scope: &S,
    role: &str,
    set: &SelectorSet,
    query_timeout: Duration,
    logger: &ScrapeLogger,
) -> Option<Vec<S::Node>> {
    for selector in set.iter() {
        match time::timeout(query_timeout, scope.query_all(selector)).await {
            Ok(Ok(nodes)) if !nodes.is_empty() => {
                logger.debug(
                    format!("located {} element(s) for {role}", nodes.len()),
                    Some("locate"),
                    Some(json!({ "selector": selector })),
                );
                return Some(nodes);
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                logger.warn(
                    format!("selector for {role} failed: {err}"),
                    Some("locate"),
                    Some(json!({ "selector": selector })),
                );
            }
            Err(_) => {
                logger.warn(
                    format!("selector for {role} timed out"),
                    Some("locate"),
                    Some(json!({
                        "selector": selector,
                        "timeout_ms": query_timeout.as_millis() as u64,
                    })),
                );
            }
        }
    }
    None
}

fn backend_error(err: impl std::fmt::Display) -> QueryError {
    QueryError::Backend(err.to_string())
}

#[async_trait]
impl DomScope for chromiumoxide::page::Page {
    type Node = chromiumoxide::element::Element;

    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, QueryError> {
        self.find_elements(selector).await.map_err(backend_error)
    }
}

#[async_trait]
impl DomScope for chromiumoxide::element::Element {
    type Node = chromiumoxide::element::Element;

    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Node>, QueryError> {
        self.find_elements(selector).await.map_err(backend_error)
    }
}

#[async_trait]
impl DomNode for chromiumoxide::element::Element {
    async fn text(&self) -> Result<Option<String>, QueryError> {
        self.inner_text()
            .await
            .map_err(|err| QueryError::Text(err.to_string()))
    }
}
