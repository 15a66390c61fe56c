//! Run result model
//!
//! These types mirror the payload the in-page instrumentation posts back to
//! the host when a suite finishes, and the JSON artifact written to disk.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Exit status for a run with no failing tests
pub const EXIT_SUCCESS: i32 = 0;

/// Exit status for failing tests or any fatal orchestration error
pub const EXIT_FAILURE: i32 = 1;

/// A single test outcome as reported by the in-browser framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub title: String,

    /// Hierarchical title through all enclosing suites
    pub full_title: String,

    /// Duration in milliseconds; absent for pending tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    /// Own properties of the thrown error, empty when the test did not fail
    #[serde(default)]
    pub err: Map<String, Value>,
}

impl TestRecord {
    pub fn new(title: impl Into<String>, full_title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            full_title: full_title.into(),
            duration: None,
            err: Map::new(),
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration = Some(ms);
        self
    }

    pub fn with_error(mut self, err: Map<String, Value>) -> Self {
        self.err = err;
        self
    }

    /// Message of the captured error, if any
    pub fn error_message(&self) -> Option<&str> {
        self.err.get("message").and_then(Value::as_str)
    }

    pub fn has_error(&self) -> bool {
        !self.err.is_empty()
    }
}

/// Which outcome list a test event lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestOutcome {
    Pass,
    Fail,
    Pending,
}

/// Aggregate counters and timing for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub tests: usize,
    pub passes: usize,
    pub pending: usize,
    pub failures: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Milliseconds between start and end
    pub duration: u64,
}

impl RunStats {
    pub fn summary(&self) -> String {
        format!(
            "{} passing, {} failing, {} pending ({} ms)",
            self.passes, self.failures, self.pending, self.duration
        )
    }
}

/// The complete structured outcome of one suite execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub stats: RunStats,
    pub tests: Vec<TestRecord>,
    pub pending: Vec<TestRecord>,
    pub failures: Vec<TestRecord>,
    pub passes: Vec<TestRecord>,
}

impl RunResult {
    /// Build a result from test events in the order they were emitted.
    ///
    /// Every event is appended to `tests` and to exactly one outcome list;
    /// stats are derived from the list lengths.
    pub fn from_events<I>(events: I, start: DateTime<Utc>, end: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (TestOutcome, TestRecord)>,
    {
        let mut tests = Vec::new();
        let mut pending = Vec::new();
        let mut failures = Vec::new();
        let mut passes = Vec::new();

        for (outcome, record) in events {
            tests.push(record.clone());
            match outcome {
                TestOutcome::Pass => passes.push(record),
                TestOutcome::Fail => failures.push(record),
                TestOutcome::Pending => pending.push(record),
            }
        }

        let duration = (end - start).num_milliseconds().max(0) as u64;

        Self {
            stats: RunStats {
                tests: tests.len(),
                passes: passes.len(),
                pending: pending.len(),
                failures: failures.len(),
                start,
                end,
                duration,
            },
            tests,
            pending,
            failures,
            passes,
        }
    }

    /// Verify the counting invariants of a result received from the page.
    ///
    /// `tests == passes + failures + pending`, the counters match the list
    /// lengths, and each record of `tests` occurs in exactly one outcome list.
    pub fn check_consistency(&self) -> Result<()> {
        let s = &self.stats;
        if s.tests != s.passes + s.failures + s.pending {
            return Err(Error::InvalidReport(format!(
                "tests ({}) != passes ({}) + failures ({}) + pending ({})",
                s.tests, s.passes, s.failures, s.pending
            )));
        }

        let lengths = [
            ("tests", s.tests, self.tests.len()),
            ("passes", s.passes, self.passes.len()),
            ("failures", s.failures, self.failures.len()),
            ("pending", s.pending, self.pending.len()),
        ];
        for (name, counted, listed) in lengths {
            if counted != listed {
                return Err(Error::InvalidReport(format!(
                    "stats.{name} is {counted} but {listed} records were listed"
                )));
            }
        }

        let mut balance: HashMap<(&str, &str), i64> = HashMap::new();
        for t in &self.tests {
            *balance.entry((t.full_title.as_str(), t.title.as_str())).or_default() += 1;
        }
        for t in self.passes.iter().chain(&self.failures).chain(&self.pending) {
            *balance.entry((t.full_title.as_str(), t.title.as_str())).or_default() -= 1;
        }
        if let Some(((full_title, _), _)) = balance.iter().find(|(_, n)| **n != 0) {
            return Err(Error::InvalidReport(format!(
                "'{full_title}' is not listed in exactly one outcome list"
            )));
        }

        Ok(())
    }
}

/// Envelope posted by the page and written as the result artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MochaReport {
    pub result: RunResult,
}

impl MochaReport {
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Process-level verdict derived from a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub failures: usize,
}

impl RunOutcome {
    pub fn from_result(result: &RunResult) -> Self {
        Self {
            failures: result.stats.failures,
        }
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }
}
