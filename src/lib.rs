//! menucard — menu extraction over a headless browser.
//!
//! Given a restaurant's menu-page URL, the pipeline drives headless
//! Chromium (via `chromiumoxide`) to the page, waits for the page's own
//! client-side rendering to finish, locates the restaurant name and menu
//! items through prioritised selector lists, and returns a structured
//! result. The HTTP server in [`server`] is a thin shell over
//! [`scrape::run`]; the pipeline itself only depends on the injected
//! configuration, selector set, and logger.

pub mod config;
pub mod error;
pub mod extract;
pub mod locate;
pub mod logging;
pub mod navigate;
pub mod price;
pub mod scrape;
pub mod selectors;
pub mod server;
pub mod session;
