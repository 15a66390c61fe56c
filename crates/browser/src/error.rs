//! Error types for browser-driven runs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("No Chromium executable found. Set browser.executable_path or CHROME_PATH")]
    BrowserNotFound,

    #[error("Browser executable does not exist: {0}")]
    ExecutableMissing(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("DevTools protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout waiting for suite completion after {ms} ms")]
    Timeout { ms: u64 },

    #[error("Browser disconnected before the suite reported completion")]
    Disconnected,

    #[error("Malformed run report: {0}")]
    InvalidReport(String),

    #[error(transparent)]
    Common(#[from] mocharun_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
