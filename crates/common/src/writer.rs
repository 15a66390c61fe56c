//! Result and coverage artifacts on disk

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::coverage::{report_path, CoverageEntry, CoverageFilter, CoverageSummary};
use crate::error::Result;
use crate::report::MochaReport;

/// Writes the run result artifact
#[derive(Debug, Clone)]
pub struct ResultWriter {
    result_path: PathBuf,
}

impl ResultWriter {
    pub fn new(result_path: impl Into<PathBuf>) -> Self {
        Self {
            result_path: result_path.into(),
        }
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// Write the report as indented JSON, replacing any previous artifact
    pub fn write_report(&self, report: &MochaReport) -> Result<PathBuf> {
        write_json(&self.result_path, report)?;
        info!("Results written to: {}", self.result_path.display());
        Ok(self.result_path.clone())
    }
}

/// Destination for filtered coverage data
#[derive(Debug, Clone)]
pub struct CoverageSink {
    storage_path: PathBuf,
    include_hostname: bool,
}

impl CoverageSink {
    pub fn new(storage_path: impl Into<PathBuf>, include_hostname: bool) -> Self {
        Self {
            storage_path: storage_path.into(),
            include_hostname,
        }
    }

    /// Filter, summarise and persist coverage entries.
    ///
    /// Writes `coverage.json` (entries keyed by report path) and
    /// `summary.json` under the storage path. Entries sharing a report path
    /// are merged so both files describe the same set of sources.
    pub fn write(&self, entries: &[CoverageEntry], filter: &CoverageFilter) -> Result<CoverageSummary> {
        let mut files: BTreeMap<String, CoverageEntry> = BTreeMap::new();
        for entry in filter.apply(entries) {
            match files.entry(report_path(&entry.url, self.include_hostname)) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                Entry::Occupied(mut slot) => slot.get_mut().absorb(entry),
            }
        }

        let merged: Vec<CoverageEntry> = files.values().cloned().collect();
        let summary = CoverageSummary::from_entries(&merged);
        info!("{}", summary.describe());

        write_json(&self.storage_path.join("coverage.json"), &files)?;
        write_json(&self.storage_path.join("summary.json"), &summary)?;
        info!("Coverage written to: {}", self.storage_path.display());

        Ok(summary)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
