//! Selector configuration for markup-drift tolerance.
//!
//! Each semantic role (restaurant name, menu item container, item name, item
//! price) carries an ordered list of candidate selectors, most specific
//! first. Supporting a redesigned page layout is a data change to the
//! selector file, not a code change; the [`SelectorStore`] picks up edits to
//! that file without a restart.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::logging::ScrapeLogger;

/// Ordered, prioritised list of selectors for one semantic role.
///
/// Invariant: never empty. Order encodes priority; the locator stops at the
/// first selector that matches anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SelectorSet(Vec<String>);

impl SelectorSet {
    pub fn new(selectors: Vec<String>) -> Result<Self, SelectorError> {
        let selectors: Vec<String> = selectors
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if selectors.is_empty() {
            return Err(SelectorError::EmptySet);
        }
        Ok(SelectorSet(selectors))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for SelectorSet {
    type Error = SelectorError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        SelectorSet::new(value)
    }
}

impl From<SelectorSet> for Vec<String> {
    fn from(value: SelectorSet) -> Self {
        value.0
    }
}

/// One [`SelectorSet`] per semantic role of a menu page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorConfig {
    pub restaurant_name: SelectorSet,
    pub menu_item: SelectorSet,
    pub item_name: SelectorSet,
    pub item_price: SelectorSet,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        fn set(selectors: &[&str]) -> SelectorSet {
            SelectorSet(selectors.iter().map(|s| s.to_string()).collect())
        }

        // Current data-qa attributes first, legacy class names as fallbacks.
        SelectorConfig {
            restaurant_name: set(&[
                r#"[data-qa="restaurant-header-title"]"#,
                "h1.restaurant-name",
                "header h1",
            ]),
            menu_item: set(&[
                r#"[data-qa="menu-item"]"#,
                ".menu-item",
                r#"[data-qa="item"]"#,
            ]),
            item_name: set(&[r#"[data-qa="item-name"]"#, ".item-name", "h3"]),
            item_price: set(&[r#"[data-qa="item-price"]"#, ".item-price"]),
        }
    }
}

impl SelectorConfig {
    /// Load a selector configuration from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, SelectorError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SelectorError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| SelectorError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("selector set must contain at least one non-blank selector")]
    EmptySet,
    #[error("failed to read selector file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse selector file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Fingerprint of the backing file used to detect edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

struct StoreState {
    stamp: Option<FileStamp>,
    current: SelectorConfig,
}

/// Hot-reloadable selector source.
///
/// Without a backing file the store serves the built-in defaults. With one,
/// every [`SelectorStore::current`] call compares the file's
/// modification-time/length fingerprint and reloads on change; a file that
/// turns unreadable or invalid keeps the last good configuration.
pub struct SelectorStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl SelectorStore {
    /// Create a store, performing the initial load. A broken selector file
    /// is a hard error here: starting up with selectors that will never
    /// match silently is worse than refusing to start.
    pub async fn open(path: Option<PathBuf>) -> Result<Self, SelectorError> {
        let (stamp, current) = match &path {
            Some(path) => {
                let config = SelectorConfig::load(path).await?;
                (stamp_file(path).await, config)
            }
            None => (None, SelectorConfig::default()),
        };

        Ok(Self {
            path,
            state: RwLock::new(StoreState { stamp, current }),
        })
    }

    /// Store serving the built-in defaults, never reloading.
    pub fn fixed(config: SelectorConfig) -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState {
                stamp: None,
                current: config,
            }),
        }
    }

    /// Current selector configuration, reloading the backing file first if
    /// it changed since the last call.
    pub async fn current(&self, logger: &ScrapeLogger) -> SelectorConfig {
        let Some(path) = &self.path else {
            return self.state.read().await.current.clone();
        };

        let stamp = stamp_file(path).await;
        {
            let state = self.state.read().await;
            if stamp.is_none() || stamp == state.stamp {
                return state.current.clone();
            }
        }

        let mut state = self.state.write().await;
        // Another request may have reloaded while we waited for the lock.
        if stamp == state.stamp {
            return state.current.clone();
        }

        match SelectorConfig::load(path).await {
            Ok(config) => {
                logger.info(
                    format!("reloaded selector configuration from {}", path.display()),
                    Some("selectors"),
                    None,
                );
                state.stamp = stamp;
                state.current = config;
            }
            Err(err) => {
                logger.warn(
                    format!("keeping previous selector configuration: {err}"),
                    Some("selectors"),
                    None,
                );
                state.stamp = stamp;
            }
        }
        state.current.clone()
    }
}

async fn stamp_file(path: &Path) -> Option<FileStamp> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    Some(FileStamp {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}
