//! Command line arguments and their mapping onto the harness config

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mocharun_common::config::DEFAULT_CONFIG_FILE;
use mocharun_common::HarnessConfig;

use crate::output::SummaryFormat;

/// mocharun - run a Mocha suite in headless Chromium
#[derive(Parser, Debug)]
#[command(name = "mocharun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, env = "MOCHARUN_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Directory served as the site root
    #[arg(long, env = "MOCHARUN_ROOT")]
    pub root: Option<PathBuf>,

    /// Static server port
    #[arg(short, long, env = "MOCHARUN_PORT")]
    pub port: Option<u16>,

    /// Harness page, relative to the site root
    #[arg(long, env = "MOCHARUN_PAGE")]
    pub page: Option<String>,

    /// Milliseconds to wait for the suite to report completion
    #[arg(long, env = "MOCHARUN_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Result artifact path
    #[arg(short, long, env = "MOCHARUN_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Chromium executable
    #[arg(long, env = "MOCHARUN_BROWSER")]
    pub browser: Option<PathBuf>,

    /// Reporter used when the page does not pick one
    #[arg(long, env = "MOCHARUN_REPORTER")]
    pub reporter: Option<String>,

    /// Launch Chromium with --no-sandbox
    #[arg(long, env = "MOCHARUN_NO_SANDBOX")]
    pub no_sandbox: bool,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Collect JS/CSS byte coverage
    #[arg(long, env = "MOCHARUN_COVERAGE")]
    pub coverage: bool,

    /// Summary printed to stderr after the run
    #[arg(long, value_enum, default_value_t)]
    pub summary: SummaryFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the suite (default)
    Run,

    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Apply flags on top of file values; flags win
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(root) = &self.root {
            config.server.root = root.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(page) = &self.page {
            config.run.page = page.clone();
        }
        if let Some(ms) = self.timeout_ms {
            config.run.completion_timeout_ms = ms;
        }
        if let Some(output) = &self.output {
            config.output.result_path = output.clone();
        }
        if let Some(browser) = &self.browser {
            config.browser.executable_path = Some(browser.clone());
        }
        if let Some(reporter) = &self.reporter {
            config.run.reporter = reporter.clone();
        }
        if self.no_sandbox {
            config.browser.no_sandbox = true;
        }
        if self.headful {
            config.browser.headless = false;
        }
        if self.coverage {
            config.coverage.enabled = true;
        }
    }

    /// Load the config file and apply overrides
    pub fn resolve_config(&self) -> mocharun_common::Result<HarnessConfig> {
        let mut config = HarnessConfig::load(&self.config)?;
        self.apply(&mut config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mocharun").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_keep_defaults() {
        let cli = parse(&[]);
        let mut config = HarnessConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(cli.command, None);
    }

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mocharun.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[run]\npage = \"site/index.html\"\ncompletion_timeout_ms = 5000\n",
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9100",
            "--output",
            "out/result.json",
            "--coverage",
            "--headful",
        ]);
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.run.page, "site/index.html");
        assert_eq!(config.run.completion_timeout_ms, 5000);
        assert_eq!(config.output.result_path, PathBuf::from("out/result.json"));
        assert!(config.coverage.enabled);
        assert!(!config.browser.headless);
    }

    #[test]
    fn browser_flag_sets_executable() {
        let cli = parse(&["--browser", "/opt/chrome/chrome", "--no-sandbox"]);
        let mut config = HarnessConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.browser.executable_path, Some(PathBuf::from("/opt/chrome/chrome")));
        assert!(config.browser.no_sandbox);
    }

    #[test]
    fn init_subcommand_parses() {
        let cli = parse(&["init", "--force"]);
        assert_eq!(cli.command, Some(Command::Init { force: true }));
    }
}
