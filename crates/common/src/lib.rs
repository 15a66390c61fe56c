//! mocharun Common Library
//!
//! Shared result model, coverage accounting, artifact writers and
//! configuration for the mocharun headless test harness.

pub mod config;
pub mod coverage;
pub mod error;
pub mod report;
pub mod writer;

// Re-export commonly used types
pub use config::HarnessConfig;
pub use coverage::{CoverageEntry, CoverageFilter, CoverageRange, CoverageSummary};
pub use error::{Error, Result};
pub use report::{MochaReport, RunOutcome, RunResult, RunStats, TestOutcome, TestRecord};
pub use writer::{CoverageSink, ResultWriter};

/// mocharun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
