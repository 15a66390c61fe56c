//! Browser discovery and launch

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use mocharun_common::config::BrowserConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BrowserError, BrowserResult};

/// Environment variable naming a Chromium executable
pub const CHROME_PATH_ENV: &str = "CHROME_PATH";

#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
];

#[cfg(target_os = "windows")]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

const PATH_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

/// Installed browsers, in preference order, without duplicates
pub fn discover_installations() -> Vec<PathBuf> {
    let from_env = std::env::var_os(CHROME_PATH_ENV).map(PathBuf::from);
    let locations = INSTALL_LOCATIONS.iter().map(PathBuf::from);
    let on_path = search_path(std::env::var_os("PATH"), PATH_NAMES);

    let mut found: Vec<PathBuf> = Vec::new();
    for candidate in from_env.into_iter().chain(locations).chain(on_path) {
        if candidate.is_file() && !found.contains(&candidate) {
            found.push(candidate);
        }
    }
    found
}

/// Look up executable names in a `PATH`-style variable
pub fn search_path(path_var: Option<OsString>, names: &[&str]) -> Vec<PathBuf> {
    let Some(path_var) = path_var else {
        return Vec::new();
    };
    let dirs: Vec<PathBuf> = std::env::split_paths(&path_var).collect();
    names
        .iter()
        .flat_map(|name| {
            dirs.iter().map(move |dir| {
                let mut p = dir.join(name);
                if cfg!(windows) {
                    p.set_extension("exe");
                }
                p
            })
        })
        .filter(|p| p.is_file())
        .collect()
}

/// Pick the executable: the configured one, else the first discovered
pub fn resolve_executable(configured: Option<&Path>) -> BrowserResult<PathBuf> {
    if let Some(path) = configured {
        if !path.exists() {
            return Err(BrowserError::ExecutableMissing(path.display().to_string()));
        }
        return Ok(path.to_path_buf());
    }

    let found = discover_installations();
    info!("Browser installations: {:?}", found);
    found.into_iter().next().ok_or(BrowserError::BrowserNotFound)
}

/// Translate harness browser options into a launch config
pub fn launch_config(config: &BrowserConfig, executable: &Path) -> BrowserResult<CdpBrowserConfig> {
    let mut builder = CdpBrowserConfig::builder().chrome_executable(executable);
    if !config.headless {
        builder = builder.with_head();
    }
    if config.no_sandbox {
        builder = builder.no_sandbox();
    }
    if !config.args.is_empty() {
        builder = builder.args(config.args.clone());
    }
    builder.build().map_err(BrowserError::Launch)
}

/// A launched browser and the task pumping its DevTools connection.
///
/// Call [`BrowserSession::close`] when done; dropping the session without
/// closing still stops the handler task and kills the child process.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(config: &BrowserConfig) -> BrowserResult<Self> {
        let executable = resolve_executable(config.executable_path.as_deref())?;
        info!("Launching browser: {}", executable.display());

        let cdp_config = launch_config(config, &executable)?;
        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("devtools handler: {}", e);
                }
            }
        });

        Ok(Self { browser, handler })
    }

    pub async fn new_page(&self) -> BrowserResult<Page> {
        Ok(self.browser.new_page("about:blank").await?)
    }

    /// Close the browser process; errors are logged, never propagated
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for browser exit failed: {}", e);
        }
        self.handler.abort();
        debug!("Browser closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
