//! Field extraction and result assembly.
//!
//! Everything here is written assuming the expected structure is absent:
//! every locate and every text read returns an option, and a menu item that
//! cannot be fully resolved is dropped with a warning instead of surfacing
//! half-filled data. Only navigation-level problems (handled upstream) can
//! fail a request; a page with zero recognisable menu items is a valid,
//! reportable result.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::locate::{DomNode, DomScope, locate_first};
use crate::logging::ScrapeLogger;
use crate::price::parse_price;
use crate::selectors::{SelectorConfig, SelectorSet};

/// Immutable input to one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// The menu page to load.
    pub target_url: String,
    /// Name to report when the page does not expose one. Guarantees the
    /// result always carries a restaurant name.
    pub fallback_restaurant_name: String,
}

/// One fully-resolved menu entry. Never constructed with an empty name or a
/// negative price; partially-resolved candidates are discarded upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price: f64,
}

/// Assembled outcome of one extraction run.
///
/// `items` stays private so the item count can only ever be derived from
/// it; there is no way to construct a result where the two disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    restaurant_name: String,
    items: Vec<MenuItem>,
    warnings: Vec<String>,
}

impl ExtractionResult {
    pub fn new(
        restaurant_name: impl Into<String>,
        items: Vec<MenuItem>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            restaurant_name: restaurant_name.into(),
            items,
            warnings,
        }
    }

    pub fn restaurant_name(&self) -> &str {
        &self.restaurant_name
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    /// Always `items().len()`; derived, never stored.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_parts(self) -> (String, Vec<MenuItem>, Vec<String>) {
        (self.restaurant_name, self.items, self.warnings)
    }
}

/// Run the full field-extraction pass against a loaded document.
pub async fn extract_menu<S: DomScope>(
    document: &S,
    request: &ExtractionRequest,
    selectors: &SelectorConfig,
    query_timeout: Duration,
    logger: &ScrapeLogger,
) -> ExtractionResult {
    let mut warnings = Vec::new();

    let restaurant_name =
        resolve_restaurant_name(document, request, selectors, query_timeout, logger, &mut warnings)
            .await;
    let items =
        collect_menu_items(document, selectors, query_timeout, logger, &mut warnings).await;

    logger.info(
        format!(
            "extracted {} menu item(s) for '{restaurant_name}'",
            items.len()
        ),
        Some("extract"),
        None,
    );

    ExtractionResult::new(restaurant_name, items, warnings)
}

async fn resolve_restaurant_name<S: DomScope>(
    document: &S,
    request: &ExtractionRequest,
    selectors: &SelectorConfig,
    query_timeout: Duration,
    logger: &ScrapeLogger,
    warnings: &mut Vec<String>,
) -> String {
    if let Some(name) = field_text(
        document,
        "restaurant name",
        &selectors.restaurant_name,
        query_timeout,
        logger,
    )
    .await
    {
        return name;
    }

    warnings.push("restaurant name not found on page; using requested fallback".to_string());
    request.fallback_restaurant_name.clone()
}

async fn collect_menu_items<S: DomScope>(
    document: &S,
    selectors: &SelectorConfig,
    query_timeout: Duration,
    logger: &ScrapeLogger,
    warnings: &mut Vec<String>,
) -> Vec<MenuItem> {
    let Some(containers) = locate_first(
        document,
        "menu item container",
        &selectors.menu_item,
        query_timeout,
        logger,
    )
    .await
    else {
        warnings.push("no menu item containers matched; returning empty menu".to_string());
        return Vec::new();
    };

    let mut items = Vec::with_capacity(containers.len());
    for (index, container) in containers.iter().enumerate() {
        // Sub-fields are located within this container only; matching
        // against the whole document would pair names and prices across
        // different items.
        match extract_item(container, selectors, query_timeout, logger).await {
            Ok(item) => items.push(item),
            Err(reason) => {
                warnings.push(format!("menu item {index} skipped: {reason}"));
            }
        }
    }
    items
}

async fn extract_item<N: DomNode>(
    container: &N,
    selectors: &SelectorConfig,
    query_timeout: Duration,
    logger: &ScrapeLogger,
) -> Result<MenuItem, String> {
    let name = field_text(container, "item name", &selectors.item_name, query_timeout, logger)
        .await
        .ok_or_else(|| "item name not located".to_string())?;

    let raw_price = field_text(
        container,
        "item price",
        &selectors.item_price,
        query_timeout,
        logger,
    )
    .await
    .ok_or_else(|| "item price not located".to_string())?;

    let price = parse_price(&raw_price)
        .ok_or_else(|| format!("unparsable price text '{raw_price}'"))?;

    Ok(MenuItem { name, price })
}

/// First matching element's trimmed text for a role, or `None` when the
/// selector set is exhausted or the text is blank.
async fn field_text<S: DomScope>(
    scope: &S,
    role: &str,
    set: &SelectorSet,
    query_timeout: Duration,
    logger: &ScrapeLogger,
) -> Option<String> {
    let nodes = locate_first(scope, role, set, query_timeout, logger).await?;
    let first = nodes.first()?;
    match first.text().await {
        Ok(Some(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Ok(None) => None,
        Err(err) => {
            logger.warn(
                format!("failed to read {role} text: {err}"),
                Some("extract"),
                None,
            );
            None
        }
    }
}
