//! Full pipeline: serve, drive the browser, write artifacts

use std::path::PathBuf;

use async_trait::async_trait;
use mocharun_common::report::EXIT_FAILURE;
use mocharun_common::{
    CoverageSink, CoverageSummary, HarnessConfig, ResultWriter, RunOutcome, RunStats, TestRecord,
};
use mocharun_web::StaticServer;
use tracing::{error, info, warn};

use crate::controller::{BrowserController, BrowserRun};
use crate::error::BrowserResult;

/// Executes the suite behind a URL and returns its report
#[async_trait]
pub trait SuiteDriver: Send + Sync {
    async fn run_suite(&self, url: &str) -> BrowserResult<BrowserRun>;
}

#[async_trait]
impl SuiteDriver for BrowserController {
    async fn run_suite(&self, url: &str) -> BrowserResult<BrowserRun> {
        self.run(url).await
    }
}

/// Result of a completed pipeline
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub stats: RunStats,
    /// Failing tests in report order
    pub failures: Vec<TestRecord>,
    pub result_path: PathBuf,
    pub coverage: Option<CoverageSummary>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

pub struct Harness<D = BrowserController> {
    config: HarnessConfig,
    driver: D,
}

impl Harness<BrowserController> {
    pub fn new(config: HarnessConfig) -> Self {
        let driver = BrowserController::new(&config);
        Self { config, driver }
    }
}

impl<D: SuiteDriver> Harness<D> {
    pub fn with_driver(config: HarnessConfig, driver: D) -> Self {
        Self { config, driver }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn run(&self) -> BrowserResult<RunSummary> {
        let server = StaticServer::bind(&self.config.server).await?;
        let url = server.url_for(&self.config.page_path());

        let run = self.driver.run_suite(&url).await?;
        drop(server);

        let result = &run.report.result;
        if let Err(e) = result.check_consistency() {
            warn!("Inconsistent run report: {}", e);
        }

        let result_path = ResultWriter::new(&self.config.output.result_path).write_report(&run.report)?;

        let coverage = match &run.coverage {
            Some(entries) => {
                let cov = &self.config.coverage;
                let sink = CoverageSink::new(&cov.storage_path, cov.include_hostname);
                Some(sink.write(entries, &cov.filter)?)
            }
            None => None,
        };

        let stats = result.stats.clone();
        info!("{}", stats.summary());

        Ok(RunSummary {
            outcome: RunOutcome::from_result(result),
            stats,
            failures: result.failures.clone(),
            result_path,
            coverage,
        })
    }
}

/// Process exit code for a pipeline outcome; errors count as failure
pub fn exit_code(outcome: &BrowserResult<RunSummary>) -> i32 {
    match outcome {
        Ok(summary) => summary.exit_code(),
        Err(e) => {
            error!("{}", e);
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowserError;
    use chrono::Utc;
    use mocharun_common::RunResult;

    fn summary(failures: usize) -> RunSummary {
        let now = Utc::now();
        let result = RunResult::from_events(std::iter::empty(), now, now);
        RunSummary {
            outcome: RunOutcome { failures },
            stats: result.stats,
            failures: Vec::new(),
            result_path: PathBuf::from("out.json"),
            coverage: None,
        }
    }

    #[test]
    fn exit_code_follows_failures() {
        assert_eq!(exit_code(&Ok(summary(0))), 0);
        assert_eq!(exit_code(&Ok(summary(3))), 1);
    }

    #[test]
    fn fatal_errors_exit_one() {
        assert_eq!(exit_code(&Err(BrowserError::BrowserNotFound)), 1);
        assert_eq!(exit_code(&Err(BrowserError::Timeout { ms: 60_000 })), 1);
    }
}
