//! mocharun Browser Library
//!
//! Launches Chromium over the DevTools protocol, instruments the harness
//! page, relays its console output and collects the posted run result.

pub mod console;
pub mod controller;
pub mod coverage;
pub mod error;
pub mod launcher;
pub mod runner;
pub mod shim;

pub use controller::{BrowserController, BrowserRun};
pub use error::{BrowserError, BrowserResult};
pub use runner::{exit_code, Harness, RunSummary, SuiteDriver};
pub use shim::ShimConfig;
