//! Pipeline tests with a scripted driver in place of Chromium

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use mocharun_browser::console::SharedBuffer;
use mocharun_browser::{exit_code, BrowserError, BrowserResult, BrowserRun, Harness, SuiteDriver};
use mocharun_common::report::TestOutcome;
use mocharun_common::{
    CoverageEntry, CoverageRange, HarnessConfig, MochaReport, RunResult, TestRecord,
};
use serde_json::{json, Map, Value};

/// Loads the harness page like a browser would, then reports a canned run
enum Scripted {
    Report(Vec<(TestOutcome, TestRecord)>),
    ReportWithCoverage(Vec<(TestOutcome, TestRecord)>),
    Silent { timeout_ms: u64 },
}

#[async_trait]
impl SuiteDriver for Scripted {
    async fn run_suite(&self, url: &str) -> BrowserResult<BrowserRun> {
        let page = reqwest::get(url).await.expect("harness page request");
        assert!(page.status().is_success(), "harness page not served: {url}");

        let start = Utc::now();
        let end = start + ChronoDuration::milliseconds(25);
        let report = |events: &Vec<(TestOutcome, TestRecord)>| MochaReport {
            result: RunResult::from_events(events.clone(), start, end),
        };

        match self {
            Scripted::Report(events) => Ok(BrowserRun {
                report: report(events),
                coverage: None,
            }),
            Scripted::ReportWithCoverage(events) => {
                let base = url.trim_end_matches("dev/mocha-runner.html");
                Ok(BrowserRun {
                    report: report(events),
                    coverage: Some(vec![
                        CoverageEntry {
                            url: format!("{base}app/calc.js"),
                            text: "x".repeat(200),
                            ranges: vec![CoverageRange::new(0, 150)],
                        },
                        CoverageEntry {
                            url: format!("{base}app/calc.test.js"),
                            text: "y".repeat(100),
                            ranges: vec![CoverageRange::new(0, 100)],
                        },
                        CoverageEntry {
                            url: format!("{base}node_modules/mocha/mocha.js"),
                            text: "z".repeat(1000),
                            ranges: vec![CoverageRange::new(0, 10)],
                        },
                    ]),
                })
            }
            Scripted::Silent { timeout_ms } => Err(BrowserError::Timeout { ms: *timeout_ms }),
        }
    }
}

fn passed(title: &str) -> (TestOutcome, TestRecord) {
    (
        TestOutcome::Pass,
        TestRecord::new(title, format!("math {title}")).with_duration(2),
    )
}

fn failed(title: &str, message: &str) -> (TestOutcome, TestRecord) {
    let mut err = Map::new();
    err.insert("message".to_string(), Value::from(message));
    err.insert("code".to_string(), Value::from("E_X"));
    (
        TestOutcome::Fail,
        TestRecord::new(title, format!("math {title}"))
            .with_duration(1)
            .with_error(err),
    )
}

fn workspace() -> (tempfile::TempDir, HarnessConfig) {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("dev")).unwrap();
    std::fs::write(
        dir.path().join("dev/mocha-runner.html"),
        "<!doctype html><script src=\"../app/calc.test.js\"></script>",
    )
    .unwrap();

    let mut config = HarnessConfig::default();
    config.server.root = dir.path().to_path_buf();
    config.server.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.server.port = 0;
    config.output.result_path = dir.path().join("output/test/mocha-test-result.json");
    config.coverage.storage_path = dir.path().join(".nyc_output");
    (dir, config)
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).expect("artifact")).expect("json")
}

#[tokio::test]
async fn failing_test_writes_artifact_and_exits_one() {
    let (_dir, config) = workspace();
    let result_path = config.output.result_path.clone();
    let harness = Harness::with_driver(
        config,
        Scripted::Report(vec![passed("adds"), failed("throws", "boom")]),
    );

    let outcome = harness.run().await;
    assert_eq!(exit_code(&outcome), 1);

    let summary = outcome.unwrap();
    assert_eq!(summary.result_path, result_path);
    assert_eq!(summary.stats.summary(), "1 passing, 1 failing, 0 pending (25 ms)");

    let written = read_json(&result_path);
    let result = &written["result"];
    assert_eq!(result["stats"]["tests"], 2);
    assert_eq!(result["stats"]["failures"], 1);
    assert_eq!(result["tests"][0]["title"], "adds");
    assert_eq!(result["tests"][1]["fullTitle"], "math throws");
    assert_eq!(result["failures"][0]["err"], json!({"message": "boom", "code": "E_X"}));
    assert_eq!(result["passes"][0]["err"], json!({}));
}

#[tokio::test]
async fn result_path_is_logged_once() {
    let logs = SharedBuffer::new();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (_dir, config) = workspace();
    let harness = Harness::with_driver(config, Scripted::Report(vec![passed("adds")]));
    harness.run().await.unwrap();

    let logs = logs.contents();
    assert_eq!(logs.matches("Results written to").count(), 1, "{logs}");
    assert!(logs.contains("1 passing, 0 failing, 0 pending"), "{logs}");
}

#[tokio::test]
async fn previous_artifact_is_replaced() {
    let (_dir, config) = workspace();
    let result_path = config.output.result_path.clone();
    std::fs::create_dir_all(result_path.parent().unwrap()).unwrap();
    std::fs::write(&result_path, "stale").unwrap();

    let harness = Harness::with_driver(config, Scripted::Report(vec![passed("adds")]));
    assert_eq!(exit_code(&harness.run().await), 0);
    assert_eq!(read_json(&result_path)["result"]["stats"]["passes"], 1);
}

#[tokio::test]
async fn timeout_exits_one_without_artifact() {
    let (_dir, config) = workspace();
    let result_path = config.output.result_path.clone();
    let harness = Harness::with_driver(config, Scripted::Silent { timeout_ms: 60_000 });

    let outcome = harness.run().await;
    assert!(matches!(outcome, Err(BrowserError::Timeout { ms: 60_000 })));
    assert_eq!(exit_code(&outcome), 1);
    assert!(!result_path.exists());
}

#[tokio::test]
async fn coverage_is_filtered_and_stored() {
    let (_dir, mut config) = workspace();
    config.coverage.enabled = true;
    config.coverage.include_hostname = false;
    let storage = config.coverage.storage_path.clone();
    let harness = Harness::with_driver(
        config,
        Scripted::ReportWithCoverage(vec![passed("adds"), passed("subtracts")]),
    );

    let summary = harness.run().await.expect("run");
    assert_eq!(summary.exit_code(), 0);

    let coverage = summary.coverage.expect("coverage summary");
    assert_eq!(coverage.files.len(), 1);
    assert_eq!(coverage.total_bytes, 200);
    assert_eq!(coverage.used_bytes, 150);
    assert_eq!(coverage.percent, Some(75.0));

    let files = read_json(&storage.join("coverage.json"));
    let keys: Vec<&str> = files.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["app/calc.js"]);
    assert_eq!(read_json(&storage.join("summary.json"))["used_bytes"], 150);
}

#[tokio::test]
async fn occupied_port_is_fatal() {
    let (_dir, mut config) = workspace();
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    config.server.port = blocker.local_addr().unwrap().port();

    let harness = Harness::with_driver(config, Scripted::Report(vec![passed("adds")]));
    let outcome = harness.run().await;
    assert!(matches!(
        outcome,
        Err(BrowserError::Common(mocharun_common::Error::ServerBind { .. }))
    ));
    assert_eq!(exit_code(&outcome), 1);
}
