//! Request-level failure taxonomy.
//!
//! Only navigation-level problems become a [`ScrapeError`]; per-item and
//! per-field extraction trouble is accumulated as warnings on the result
//! instead. The split matters to callers: a failed page load is retryable
//! and diagnosable, a menu item with an unreadable price is not worth
//! failing a request over.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The browser process could not be started or produced no usable
    /// browsing context. Signals environment misconfiguration; not retried.
    #[error("browser launch failed: {0}")]
    Launch(String),
    /// Transport-level failure reaching the target (DNS, refused connection).
    #[error("could not reach {url}: {reason}")]
    Transport { url: String, reason: String },
    /// The target answered with an HTTP error status (>= 400).
    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    /// Navigation or the readiness wait exceeded its bound. Reported
    /// distinctly from [`ScrapeError::Transport`] so callers can tell a slow
    /// site from one that actively rejected the request.
    #[error("navigation to {url} exceeded {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
}
