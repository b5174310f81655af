//! HTTP surface.
//!
//! Thin shell around the extraction pipeline: it validates input, borrows
//! an admission permit, runs one extraction, and translates the outcome
//! into JSON. Navigation-level failures always map to non-2xx statuses
//! with an error detail; an empty menu is a 200 like any other successful
//! extraction.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::extract::{ExtractionRequest, MenuItem};
use crate::logging::ScrapeLogger;
use crate::scrape;
use crate::selectors::SelectorStore;

/// Shared state handed to every request handler.
pub struct AppState {
    pub config: ScrapeConfig,
    pub selectors: SelectorStore,
    pub logger: ScrapeLogger,
    /// Bounds concurrently running browser sessions; excess requests queue
    /// here instead of exhausting memory with parallel Chromium launches.
    scrape_permits: Semaphore,
}

impl AppState {
    pub fn new(config: ScrapeConfig, selectors: SelectorStore, logger: ScrapeLogger) -> Self {
        let permits = config.max_concurrent_scrapes;
        Self {
            config,
            selectors,
            logger,
            scrape_permits: Semaphore::new(permits),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrapeRequestBody {
    pub lieferando_url: String,
    pub restaurant_name: String,
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponseBody {
    pub restaurant_name: String,
    pub menu: Vec<MenuItem>,
    pub url: String,
    pub item_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/scrape", post(scrape_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn scrape_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScrapeRequestBody>,
) -> Response {
    let url = body.lieferando_url.trim().to_string();
    let fallback_name = body.restaurant_name.trim().to_string();

    if let Err(detail) = validate_input(&url, &fallback_name) {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, detail);
    }

    let _permit = match state.scrape_permits.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "service is shutting down".to_string(),
            );
        }
    };

    let request = ExtractionRequest {
        target_url: url,
        fallback_restaurant_name: fallback_name,
    };

    let selectors = state.selectors.current(&state.logger).await;

    match scrape::run(&request, &selectors, &state.config, &state.logger).await {
        Ok(result) => {
            let (restaurant_name, menu, warnings) = result.into_parts();
            let response = ScrapeResponseBody {
                restaurant_name,
                item_count: menu.len(),
                menu,
                url: request.target_url,
                warnings,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            state.logger.error(
                format!("extraction failed: {err}"),
                Some("server"),
                Some(json!({ "url": &request.target_url })),
            );
            error_response(failure_status(&err), err.to_string())
        }
    }
}

fn validate_input(url: &str, fallback_name: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("lieferando_url must not be empty".to_string());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err("lieferando_url must be an http(s) URL".to_string());
    }
    if fallback_name.is_empty() {
        return Err("restaurant_name must not be empty".to_string());
    }
    Ok(())
}

/// Response-status policy for navigation-level failures. Applied
/// consistently: failures are never smuggled inside a 200.
fn failure_status(err: &ScrapeError) -> StatusCode {
    match err {
        ScrapeError::Launch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ScrapeError::Transport { .. } | ScrapeError::HttpStatus { .. } => StatusCode::BAD_GATEWAY,
        ScrapeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn error_response(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorBody { error: detail })).into_response()
}
