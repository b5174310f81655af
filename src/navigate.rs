//! Page navigation and readiness detection.
//!
//! Navigation classifies its outcome instead of raising: the caller needs to
//! tell "the site answered with an error" apart from "the site never
//! answered" and from "we gave up waiting". After a successful load the
//! page is given a chance to finish its own client-side rendering: a
//! bounded network-quiet wait (tracked through CDP network events) followed
//! by an optional short fixed settle delay. The quiet wait is preferred
//! over a long fixed sleep so the worst case stays bounded by
//! configuration, not by hope.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Instant;

use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestServedFromCache,
    EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    self as page_domain, EventFrameStoppedLoading,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior, Sleep};

use crate::logging::ScrapeLogger;

/// Classified result of one navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The document loaded with the given HTTP status (< 400).
    Loaded(u16),
    /// The target answered, but with an error status (>= 400).
    HttpError(u16),
    /// Transport-level failure: DNS, refused connection, reset.
    NoResponse(String),
    /// The load did not finish within its bound.
    Timeout,
}

/// Navigate `page` to `url` and classify what happened.
///
/// The main document's status code is captured from the CDP
/// `Network.responseReceived` stream; the subscription is set up before the
/// load starts so the response cannot be missed.
pub async fn navigate(
    page: &Page,
    url: &str,
    timeout_ms: u64,
    logger: &ScrapeLogger,
) -> NavigationOutcome {
    enable_tracking_domains(page, logger).await;

    let mut responses = match page.event_listener::<EventResponseReceived>().await {
        Ok(stream) => Some(stream),
        Err(err) => {
            logger.debug(
                format!("response listener unavailable: {err}"),
                Some("navigate"),
                None,
            );
            None
        }
    };

    match time::timeout(Duration::from_millis(timeout_ms), page.goto(url)).await {
        Err(_) => return NavigationOutcome::Timeout,
        Ok(Err(err)) => return NavigationOutcome::NoResponse(err.to_string()),
        Ok(Ok(_)) => {}
    }

    let status = match responses.as_mut() {
        Some(stream) => document_status(page, stream, logger).await,
        None => None,
    };

    // The protocol-level load already succeeded; an unobserved document
    // response only costs us the exact status code.
    let status = status.unwrap_or_else(|| {
        logger.debug(
            "document response not observed; assuming HTTP 200",
            Some("navigate"),
            None,
        );
        200
    });

    if status >= 400 {
        NavigationOutcome::HttpError(status)
    } else {
        NavigationOutcome::Loaded(status)
    }
}

async fn enable_tracking_domains(page: &Page, logger: &ScrapeLogger) {
    if let Err(err) = page.execute(network::EnableParams::default()).await {
        logger.debug(
            format!("failed to enable Network domain: {err}"),
            Some("navigate"),
            None,
        );
    }
    if let Err(err) = page.execute(page_domain::EnableParams::default()).await {
        logger.debug(
            format!("failed to enable Page domain: {err}"),
            Some("navigate"),
            None,
        );
    }
}

/// Pull the main document's response status out of the event stream.
///
/// The event almost always precedes `goto` resolving, so this is a drain of
/// already-buffered events with a short grace period rather than a real
/// wait.
async fn document_status(
    page: &Page,
    responses: &mut EventStream<EventResponseReceived>,
    logger: &ScrapeLogger,
) -> Option<u16> {
    let main_frame = match page.mainframe().await {
        Ok(frame) => frame.map(|id| id.as_ref().to_string()),
        Err(err) => {
            logger.debug(
                format!("main frame lookup failed: {err}"),
                Some("navigate"),
                None,
            );
            None
        }
    };

    let deadline = time::sleep(Duration::from_millis(300));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            maybe_event = responses.next() => {
                let event = maybe_event?;
                if !matches!(event.r#type, ResourceType::Document) {
                    continue;
                }
                let frame = event.frame_id.as_ref().map(|id| id.as_ref().to_string());
                if main_frame.is_some() && frame.is_some() && frame != main_frame {
                    continue;
                }
                return u16::try_from(event.response.status).ok();
            }
            _ = &mut deadline => {
                return None;
            }
        }
    }
}

/// Network activity relevant to the settle wait, reduced from the raw CDP
/// event types at the listener boundary.
enum NetEvent {
    Started {
        id: String,
        url: String,
        kind: Option<ResourceType>,
        frame: Option<String>,
    },
    Finished {
        id: String,
    },
    FrameDone {
        frame: String,
    },
}

struct RequestTrace {
    url: String,
    started_at: Instant,
}

/// Wait until the page's network activity goes quiet, then apply the fixed
/// settle delay. Bounded by `settle_timeout_ms` overall; requests that stall
/// longer than the stall threshold are forced out of the inflight set so a
/// hung analytics beacon cannot hold the wait hostage.
pub async fn wait_for_ready(
    page: &Page,
    settle_timeout_ms: u64,
    settle_delay_ms: u64,
    logger: &ScrapeLogger,
) {
    if settle_timeout_ms > 0 {
        if let Err(err) = wait_for_network_quiet(page, settle_timeout_ms, logger).await {
            logger.debug(
                format!("network-quiet wait unavailable: {err}"),
                Some("settle"),
                None,
            );
        }
    }

    if settle_delay_ms > 0 {
        time::sleep(Duration::from_millis(settle_delay_ms)).await;
    }
}

async fn wait_for_network_quiet(
    page: &Page,
    timeout_ms: u64,
    logger: &ScrapeLogger,
) -> Result<(), chromiumoxide::error::CdpError> {
    const QUIET_WINDOW: Duration = Duration::from_millis(500);
    const STALL_THRESHOLD: Duration = Duration::from_secs(2);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut pumps: Vec<JoinHandle<()>> = Vec::new();

    pumps.push(spawn_event_pump(
        page.event_listener::<EventRequestWillBeSent>().await?,
        tx.clone(),
        |ev: EventRequestWillBeSent| NetEvent::Started {
            id: ev.request_id.as_ref().to_string(),
            url: ev.request.url.clone(),
            kind: ev.r#type.clone(),
            frame: ev.frame_id.as_ref().map(|id| id.as_ref().to_string()),
        },
    ));
    pumps.push(spawn_event_pump(
        page.event_listener::<EventLoadingFinished>().await?,
        tx.clone(),
        |ev: EventLoadingFinished| NetEvent::Finished {
            id: ev.request_id.as_ref().to_string(),
        },
    ));
    pumps.push(spawn_event_pump(
        page.event_listener::<EventLoadingFailed>().await?,
        tx.clone(),
        |ev: EventLoadingFailed| NetEvent::Finished {
            id: ev.request_id.as_ref().to_string(),
        },
    ));
    pumps.push(spawn_event_pump(
        page.event_listener::<EventRequestServedFromCache>().await?,
        tx.clone(),
        |ev: EventRequestServedFromCache| NetEvent::Finished {
            id: ev.request_id.as_ref().to_string(),
        },
    ));
    pumps.push(spawn_event_pump(
        page.event_listener::<EventFrameStoppedLoading>().await?,
        tx.clone(),
        |ev: EventFrameStoppedLoading| NetEvent::FrameDone {
            frame: ev.frame_id.as_ref().to_string(),
        },
    ));
    drop(tx);

    let mut inflight: HashMap<String, RequestTrace> = HashMap::new();
    let mut doc_by_frame: HashMap<String, String> = HashMap::new();

    let mut quiet_timer: Option<Pin<Box<Sleep>>> = Some(Box::pin(time::sleep(QUIET_WINDOW)));
    let mut timeout_timer = Box::pin(time::sleep(Duration::from_millis(timeout_ms)));
    let mut stall_tick = time::interval(Duration::from_millis(500));
    stall_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => handle_net_event(
                        event,
                        &mut inflight,
                        &mut doc_by_frame,
                        &mut quiet_timer,
                        QUIET_WINDOW,
                    ),
                    None => break,
                }
            }
            _ = async {
                if let Some(timer) = quiet_timer.as_mut() {
                    timer.as_mut().await;
                }
            }, if quiet_timer.is_some() => {
                break;
            }
            _ = stall_tick.tick() => {
                sweep_stalled(
                    &mut inflight,
                    &mut doc_by_frame,
                    STALL_THRESHOLD,
                    QUIET_WINDOW,
                    &mut quiet_timer,
                    logger,
                );
            }
            _ = &mut timeout_timer => {
                if !inflight.is_empty() {
                    logger.debug(
                        format!("settle timeout reached with {} inflight requests", inflight.len()),
                        Some("settle"),
                        None,
                    );
                }
                break;
            }
        }
    }

    for pump in pumps {
        pump.abort();
    }

    Ok(())
}

fn spawn_event_pump<T, F>(
    mut stream: EventStream<T>,
    tx: mpsc::UnboundedSender<NetEvent>,
    map: F,
) -> JoinHandle<()>
where
    T: IntoEventKind + Clone + Unpin + Send + 'static,
    F: Fn(T) -> NetEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let owned = (*event).clone();
            if tx.send(map(owned)).is_err() {
                break;
            }
        }
    })
}

fn handle_net_event(
    event: NetEvent,
    inflight: &mut HashMap<String, RequestTrace>,
    doc_by_frame: &mut HashMap<String, String>,
    quiet_timer: &mut Option<Pin<Box<Sleep>>>,
    quiet_window: Duration,
) {
    match event {
        NetEvent::Started { id, url, kind, frame } => {
            // Long-lived streams never finish; counting them would keep the
            // page "busy" forever.
            if matches!(
                kind,
                Some(ResourceType::WebSocket | ResourceType::EventSource)
            ) {
                return;
            }

            if matches!(kind, Some(ResourceType::Document)) {
                if let Some(frame) = frame {
                    doc_by_frame.insert(frame, id.clone());
                }
            }

            inflight.insert(
                id,
                RequestTrace {
                    url,
                    started_at: Instant::now(),
                },
            );
            *quiet_timer = None;
        }
        NetEvent::Finished { id } => {
            finish_request(&id, inflight, doc_by_frame, quiet_timer);
        }
        NetEvent::FrameDone { frame } => {
            if let Some(id) = doc_by_frame.remove(&frame) {
                finish_request(&id, inflight, doc_by_frame, quiet_timer);
            }
        }
    }

    if inflight.is_empty() && quiet_timer.is_none() {
        *quiet_timer = Some(Box::pin(time::sleep(quiet_window)));
    }
}

fn finish_request(
    id: &str,
    inflight: &mut HashMap<String, RequestTrace>,
    doc_by_frame: &mut HashMap<String, String>,
    quiet_timer: &mut Option<Pin<Box<Sleep>>>,
) {
    if inflight.remove(id).is_some() {
        *quiet_timer = None;
    }
    doc_by_frame.retain(|_, pending| pending != id);
}

fn sweep_stalled(
    inflight: &mut HashMap<String, RequestTrace>,
    doc_by_frame: &mut HashMap<String, String>,
    threshold: Duration,
    quiet_window: Duration,
    quiet_timer: &mut Option<Pin<Box<Sleep>>>,
    logger: &ScrapeLogger,
) {
    let now = Instant::now();
    let stalled: Vec<(String, String)> = inflight
        .iter()
        .filter(|(_, trace)| now.duration_since(trace.started_at) > threshold)
        .map(|(id, trace)| (id.clone(), trace.url.clone()))
        .collect();

    for (id, url) in stalled {
        logger.debug(
            "forcing completion of stalled request",
            Some("settle"),
            Some(json!({ "url": url })),
        );
        finish_request(&id, inflight, doc_by_frame, quiet_timer);
    }

    if inflight.is_empty() && quiet_timer.is_none() {
        *quiet_timer = Some(Box::pin(time::sleep(quiet_window)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str, kind: Option<ResourceType>) -> NetEvent {
        NetEvent::Started {
            id: id.to_string(),
            url: format!("https://example.test/{id}"),
            kind,
            frame: None,
        }
    }

    #[test]
    fn websocket_traffic_never_counts_as_inflight() {
        let mut inflight = HashMap::new();
        let mut docs = HashMap::new();
        let mut quiet = None;

        handle_net_event(
            started("ws-1", Some(ResourceType::WebSocket)),
            &mut inflight,
            &mut docs,
            &mut quiet,
            Duration::from_millis(500),
        );

        assert!(inflight.is_empty());
        assert!(quiet.is_some());
    }

    #[tokio::test]
    async fn quiet_timer_resets_while_requests_are_inflight() {
        let mut inflight = HashMap::new();
        let mut docs = HashMap::new();
        let mut quiet = None;
        let window = Duration::from_millis(500);

        handle_net_event(
            started("r-1", Some(ResourceType::Fetch)),
            &mut inflight,
            &mut docs,
            &mut quiet,
            window,
        );
        assert_eq!(inflight.len(), 1);
        assert!(quiet.is_none());

        handle_net_event(
            NetEvent::Finished {
                id: "r-1".to_string(),
            },
            &mut inflight,
            &mut docs,
            &mut quiet,
            window,
        );
        assert!(inflight.is_empty());
        assert!(quiet.is_some());
    }

    #[tokio::test]
    async fn frame_completion_settles_its_document_request() {
        let mut inflight = HashMap::new();
        let mut docs = HashMap::new();
        let mut quiet = None;
        let window = Duration::from_millis(500);

        handle_net_event(
            NetEvent::Started {
                id: "doc-1".to_string(),
                url: "https://example.test/menu".to_string(),
                kind: Some(ResourceType::Document),
                frame: Some("frame-a".to_string()),
            },
            &mut inflight,
            &mut docs,
            &mut quiet,
            window,
        );
        assert_eq!(docs.get("frame-a").map(String::as_str), Some("doc-1"));

        handle_net_event(
            NetEvent::FrameDone {
                frame: "frame-a".to_string(),
            },
            &mut inflight,
            &mut docs,
            &mut quiet,
            window,
        );
        assert!(inflight.is_empty());
        assert!(docs.is_empty());
        assert!(quiet.is_some());
    }

    #[tokio::test]
    async fn stalled_requests_are_swept_out() {
        let logger = crate::logging::ScrapeLogger::new(crate::config::Verbosity::Minimal);
        let mut inflight = HashMap::new();
        inflight.insert(
            "slow-1".to_string(),
            RequestTrace {
                url: "https://example.test/beacon".to_string(),
                started_at: Instant::now(),
            },
        );
        let mut docs = HashMap::new();
        let mut quiet = None;

        std::thread::sleep(Duration::from_millis(5));
        sweep_stalled(
            &mut inflight,
            &mut docs,
            Duration::ZERO,
            Duration::from_millis(500),
            &mut quiet,
            &logger,
        );

        assert!(inflight.is_empty());
        assert!(quiet.is_some());
    }
}
