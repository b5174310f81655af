//! menucard server CLI.
//!
//! Usage examples:
//!   Serve with defaults (Chromium discovered on PATH):
//!     $ cargo run --bin menucard -- serve
//!   Explicit binary, selector file, and bind address:
//!     $ MENUCARD_CHROME_BIN=/usr/bin/chromium \
//!       cargo run --bin menucard -- serve --bind 127.0.0.1:8000 \
//!         --selectors ./selectors.json

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use menucard::config::{ScrapeConfig, Verbosity};
use menucard::logging::{LogCallback, LogConfig, LogLevel, LogRecord, ScrapeLogger};
use menucard::selectors::SelectorStore;
use menucard::server::{self, AppState};

#[derive(Parser)]
#[command(name = "menucard", author, version, about = "Restaurant menu extraction service")]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind, e.g. 127.0.0.1:8000.
    #[arg(long)]
    bind: Option<String>,

    /// Selector configuration file (JSON), hot-reloaded on change.
    #[arg(long)]
    selectors: Option<PathBuf>,

    /// Chromium/Chrome executable to launch.
    #[arg(long)]
    chrome_bin: Option<PathBuf>,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    show_browser: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let verbosity = verbosity_from_count(cli.verbose);

    match cli.command {
        Command::Serve(args) => serve(args, verbosity).await,
    }
}

async fn serve(args: ServeArgs, verbosity: Verbosity) -> Result<()> {
    let mut config = ScrapeConfig::from_env().context("failed to load configuration")?;
    config.verbose = verbosity;

    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(path) = args.selectors {
        config.selector_file = Some(path);
    }
    if let Some(path) = args.chrome_bin {
        config.chrome_executable = Some(path);
    }
    if args.show_browser {
        config.headless = false;
    }

    let logger = ScrapeLogger::with_config(LogConfig {
        verbose: config.verbose,
        external_sink: Some(make_logger_callback()),
    });

    let selectors = SelectorStore::open(config.selector_file.clone())
        .await
        .context("failed to load selector configuration")?;

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, selectors, logger));
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("listening on {bind_addr}");

    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}

/// Bridge pipeline records into the process-wide `log` facade.
fn make_logger_callback() -> LogCallback {
    Arc::new(|record: &LogRecord| {
        let message = match &record.category {
            Some(category) => format!("[{category}] {}", record.message),
            None => record.message.clone(),
        };
        match record.level {
            LogLevel::Error => log::error!("{message}"),
            LogLevel::Warn => log::warn!("{message}"),
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Debug => log::debug!("{message}"),
        }
        if let Some(aux) = &record.auxiliary {
            if !aux.is_null() {
                log::debug!("    {aux}");
            }
        }
    })
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
