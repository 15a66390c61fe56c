//! In-page instrumentation
//!
//! The shim is registered to run in every new document before any page
//! script. It observes the Mocha runner through a composite reporter, posts
//! the finished run over a DevTools binding, and routes the framework's raw
//! stdout writes through `console.log` behind a sentinel token.

use serde::Serialize;

const SHIM_SOURCE: &str = include_str!("shim.js");

/// Binding the page calls with the serialized run result
pub const DEFAULT_BINDING: &str = "__mocharunReport";

/// First console argument marking a raw stdout write
pub const DEFAULT_SENTINEL: &str = "stdout:";

/// Parameters baked into the injected script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShimConfig {
    /// Name of the `Runtime.addBinding` function
    pub binding: String,

    /// Token prefixed to redirected stdout writes
    pub sentinel: String,

    /// Reporter used when the page does not choose one
    pub reporter: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            binding: DEFAULT_BINDING.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            reporter: "dot".to_string(),
        }
    }
}

impl ShimConfig {
    pub fn with_reporter(reporter: impl Into<String>) -> Self {
        Self {
            reporter: reporter.into(),
            ..Self::default()
        }
    }

    /// Self-invoking script source for `Page.addScriptToEvaluateOnNewDocument`
    pub fn script(&self) -> serde_json::Result<String> {
        let params = serde_json::to_string(self)?;
        Ok(format!("({})({});", SHIM_SOURCE.trim(), params))
    }
}
