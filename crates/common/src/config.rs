//! Harness configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coverage::CoverageFilter;
use crate::error::{Error, Result};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "mocharun.toml";

/// Top-level configuration for one harness run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Static file server
    pub server: ServerConfig,

    /// Browser launch options
    pub browser: BrowserConfig,

    /// Suite execution
    pub run: RunConfig,

    /// Result artifact
    pub output: OutputConfig,

    /// Byte-range coverage collection
    pub coverage: CoverageConfig,
}

/// Static file server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory served as the site root
    pub root: PathBuf,

    /// Loopback address to bind
    pub host: IpAddr,

    /// Port to bind
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8081,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Browser launch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chromium executable; discovered when unset
    pub executable_path: Option<PathBuf>,

    /// Run without a visible window
    pub headless: bool,

    /// Pass `--no-sandbox` (needed in most containers)
    pub no_sandbox: bool,

    /// Extra command line switches
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            no_sandbox: false,
            args: Vec::new(),
        }
    }
}

/// Suite execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Harness page, relative to the server root
    pub page: String,

    /// How long to wait for the completion message
    pub completion_timeout_ms: u64,

    /// Reporter used when the page does not choose one
    pub reporter: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            page: "dev/mocha-runner.html".to_string(),
            completion_timeout_ms: 60_000,
            reporter: "dot".to_string(),
        }
    }
}

impl RunConfig {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

/// Result artifact configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub result_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            result_path: PathBuf::from("output/test/mocha-test-result.json"),
        }
    }
}

/// Coverage collection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub enabled: bool,

    /// Directory receiving the coverage report
    pub storage_path: PathBuf,

    /// Keep the URL host in reported file paths
    pub include_hostname: bool,

    #[serde(flatten)]
    pub filter: CoverageFilter,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            storage_path: PathBuf::from(".nyc_output"),
            include_hostname: true,
            filter: CoverageFilter::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.completion_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "run.completion_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.run.page.trim().is_empty() {
            return Err(Error::InvalidConfig("run.page must not be empty".to_string()));
        }
        if let Some(path) = &self.browser.executable_path {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(
                    "browser.executable_path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// URL path of the harness page
    pub fn page_path(&self) -> String {
        format!("/{}", self.run.page.trim_start_matches('/'))
    }
}
