//! Strongly-typed service configuration.
//!
//! Values can be constructed from defaults, loaded from environment variables
//! (with optional `.env` support via `dotenvy`), or adjusted field-by-field by
//! the CLI before the server starts. All environment variables carry the
//! `MENUCARD_` prefix.

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Verbosity level for extraction logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

/// Configuration for the extraction service.
///
/// Navigation and element-location timeouts are always explicit so that a
/// slow or unreachable target page can never pin a browser process
/// indefinitely.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfig {
    /// Launch Chromium without a visible window.
    pub headless: bool,
    /// Explicit Chromium/Chrome binary; discovery is left to the launcher
    /// when unset.
    pub chrome_executable: Option<PathBuf>,
    /// User-agent string presented to the target site.
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Upper bound for the page load itself.
    pub navigation_timeout_ms: u64,
    /// Upper bound for the post-load network-quiet wait.
    pub dom_settle_timeout_ms: u64,
    /// Short fixed delay after the readiness signal, for client-side
    /// renderers that populate content just after the network goes quiet.
    pub settle_delay_ms: u64,
    /// Upper bound for a single element-location query.
    pub query_timeout_ms: u64,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Optional selector configuration file, reloaded when it changes.
    pub selector_file: Option<PathBuf>,
    /// Admission bound on concurrently running browser sessions.
    pub max_concurrent_scrapes: usize,
    pub verbose: Verbosity,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        ScrapeConfig {
            headless: true,
            chrome_executable: None,
            user_agent: None,
            viewport_width: 1280,
            viewport_height: 720,
            navigation_timeout_ms: 30_000,
            dom_settle_timeout_ms: 3_000,
            settle_delay_ms: 250,
            query_timeout_ms: 5_000,
            bind_addr: "0.0.0.0:8000".to_string(),
            selector_file: None,
            max_concurrent_scrapes: 4,
            verbose: Verbosity::default(),
        }
    }
}

impl ScrapeConfig {
    /// Construct a configuration by reading `MENUCARD_*` environment
    /// variables, after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = ScrapeConfig::default();

        if let Some(value) = env_var("MENUCARD_HEADLESS") {
            config.headless = parse_bool("MENUCARD_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("MENUCARD_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("MENUCARD_USER_AGENT") {
            config.user_agent = Some(value);
        }

        if let Some(value) = env_var("MENUCARD_VIEWPORT_WIDTH") {
            config.viewport_width = parse_u32("MENUCARD_VIEWPORT_WIDTH", &value)?;
        }

        if let Some(value) = env_var("MENUCARD_VIEWPORT_HEIGHT") {
            config.viewport_height = parse_u32("MENUCARD_VIEWPORT_HEIGHT", &value)?;
        }

        if let Some(value) = env_var("MENUCARD_NAVIGATION_TIMEOUT_MS") {
            config.navigation_timeout_ms = parse_u64("MENUCARD_NAVIGATION_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("MENUCARD_DOM_SETTLE_TIMEOUT_MS") {
            config.dom_settle_timeout_ms = parse_u64("MENUCARD_DOM_SETTLE_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("MENUCARD_SETTLE_DELAY_MS") {
            config.settle_delay_ms = parse_u64("MENUCARD_SETTLE_DELAY_MS", &value)?;
        }

        if let Some(value) = env_var("MENUCARD_QUERY_TIMEOUT_MS") {
            config.query_timeout_ms = parse_u64("MENUCARD_QUERY_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("MENUCARD_BIND_ADDR") {
            config.bind_addr = value;
        }

        if let Some(value) = env_var("MENUCARD_SELECTOR_FILE") {
            config.selector_file = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("MENUCARD_MAX_CONCURRENT_SCRAPES") {
            let parsed = parse_u64("MENUCARD_MAX_CONCURRENT_SCRAPES", &value)? as usize;
            if parsed == 0 {
                return Err(ConfigError::InvalidEnumVariant {
                    field: "MENUCARD_MAX_CONCURRENT_SCRAPES",
                    value,
                });
            }
            config.max_concurrent_scrapes = parsed;
        }

        if let Some(value) = env_var("MENUCARD_VERBOSE") {
            let parsed = parse_u8("MENUCARD_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or(ConfigError::InvalidEnumVariant {
                field: "MENUCARD_VERBOSE",
                value: parsed.to_string(),
            })?;
        }

        Ok(config)
    }
}

/// Errors that can arise while constructing a [`ScrapeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[(&str, Option<&str>)]) -> Self {
            let saved = vars
                .iter()
                .map(|(key, value)| {
                    let original = env::var(key).ok();
                    match value {
                        Some(v) => unsafe {
                            env::set_var(key, v);
                        },
                        None => unsafe {
                            env::remove_var(key);
                        },
                    };
                    ((*key).to_string(), original)
                })
                .collect();
            EnvGuard { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => unsafe {
                        env::set_var(&key, v);
                    },
                    None => unsafe {
                        env::remove_var(&key);
                    },
                }
            }
        }
    }

    fn with_env<F, T>(vars: &[(&str, Option<&str>)], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let lock = env_lock().lock().expect("env mutex poisoned");
        let guard = EnvGuard::new(vars);
        let result = f();
        drop(guard);
        drop(lock);
        result
    }

    #[test]
    fn defaults_are_sane() {
        let config = ScrapeConfig::default();
        assert!(config.headless);
        assert!(config.chrome_executable.is_none());
        assert_eq!(config.navigation_timeout_ms, 30_000);
        assert_eq!(config.dom_settle_timeout_ms, 3_000);
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.max_concurrent_scrapes, 4);
        assert_eq!(config.verbose, Verbosity::Medium);
    }

    #[test]
    fn from_env_parses_and_normalises_values() {
        let vars = [
            ("MENUCARD_HEADLESS", Some("false")),
            ("MENUCARD_CHROME_BIN", Some("/usr/bin/chromium")),
            ("MENUCARD_USER_AGENT", Some("menucard/1.0")),
            ("MENUCARD_VIEWPORT_WIDTH", Some("1024")),
            ("MENUCARD_VIEWPORT_HEIGHT", Some("768")),
            ("MENUCARD_NAVIGATION_TIMEOUT_MS", Some("12000")),
            ("MENUCARD_DOM_SETTLE_TIMEOUT_MS", Some("1500")),
            ("MENUCARD_SETTLE_DELAY_MS", Some("0")),
            ("MENUCARD_QUERY_TIMEOUT_MS", Some("2500")),
            ("MENUCARD_BIND_ADDR", Some("127.0.0.1:9001")),
            ("MENUCARD_SELECTOR_FILE", Some("/etc/menucard/selectors.json")),
            ("MENUCARD_MAX_CONCURRENT_SCRAPES", Some("2")),
            ("MENUCARD_VERBOSE", Some("2")),
        ];

        with_env(&vars, || {
            let config = ScrapeConfig::from_env().expect("config from env");
            assert!(!config.headless);
            assert_eq!(
                config.chrome_executable.as_deref(),
                Some(std::path::Path::new("/usr/bin/chromium"))
            );
            assert_eq!(config.user_agent.as_deref(), Some("menucard/1.0"));
            assert_eq!(config.viewport_width, 1024);
            assert_eq!(config.viewport_height, 768);
            assert_eq!(config.navigation_timeout_ms, 12_000);
            assert_eq!(config.dom_settle_timeout_ms, 1_500);
            assert_eq!(config.settle_delay_ms, 0);
            assert_eq!(config.query_timeout_ms, 2_500);
            assert_eq!(config.bind_addr, "127.0.0.1:9001");
            assert_eq!(config.max_concurrent_scrapes, 2);
            assert_eq!(config.verbose, Verbosity::Detailed);
        });
    }

    #[test]
    fn from_env_rejects_malformed_values() {
        with_env(&[("MENUCARD_HEADLESS", Some("maybe"))], || {
            let err = ScrapeConfig::from_env().expect_err("bool should fail");
            assert!(matches!(err, ConfigError::InvalidBool { .. }));
        });

        with_env(&[("MENUCARD_NAVIGATION_TIMEOUT_MS", Some("soon"))], || {
            let err = ScrapeConfig::from_env().expect_err("number should fail");
            assert!(matches!(err, ConfigError::InvalidNumber { .. }));
        });

        with_env(&[("MENUCARD_VERBOSE", Some("7"))], || {
            let err = ScrapeConfig::from_env().expect_err("verbosity should fail");
            assert!(matches!(err, ConfigError::InvalidEnumVariant { .. }));
        });

        with_env(&[("MENUCARD_MAX_CONCURRENT_SCRAPES", Some("0"))], || {
            let err = ScrapeConfig::from_env().expect_err("zero limit should fail");
            assert!(matches!(err, ConfigError::InvalidEnumVariant { .. }));
        });
    }

    #[test]
    fn blank_env_values_are_ignored() {
        with_env(&[("MENUCARD_USER_AGENT", Some("   "))], || {
            let config = ScrapeConfig::from_env().expect("config from env");
            assert!(config.user_agent.is_none());
        });
    }
}
