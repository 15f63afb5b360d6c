//! Command-line flags and the optional TOML settings file behind them.

use anyhow::{Context, bail};
use clap::Parser;
use feast::{Configuration, FailurePolicy, Url};
use reqwest::Method;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

const DEFAULT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_PERIOD_SECS: u64 = 10;
const MAX_WORKER_THREADS: usize = 512;

/// Runtime worker threads for a parallelism limit. `None` keeps tokio's default.
pub fn worker_threads(max_process: usize) -> Option<usize> {
    (max_process > 0).then(|| max_process.min(MAX_WORKER_THREADS))
}

/// Fetch categorized URLs concurrently and print the bodies as JSON.
#[derive(Debug, Parser)]
#[command(name = "feast", version)]
pub struct Cli {
    /// TOML settings file. Flags override its values.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// JSON file holding an array of {"Category", "Link"} objects.
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// A URL to fetch, as CATEGORY=LINK. Repeatable.
    #[arg(long = "url", short = 'u', value_name = "CATEGORY=LINK")]
    pub urls: Vec<String>,

    /// HTTP method used for every request.
    #[arg(long, short)]
    pub method: Option<String>,

    /// A header sent with every request, as NAME:VALUE. Repeatable.
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Execution period in seconds, enforced with --exit-signal.
    #[arg(long)]
    pub period_secs: Option<u64>,

    /// Skip TLS certificate verification.
    #[arg(long)]
    pub insecure: bool,

    /// Stop on SIGINT/SIGTERM or when the period elapses, printing what arrived so far.
    #[arg(long)]
    pub exit_signal: bool,

    /// Abort the whole batch on the first failed request.
    #[arg(long)]
    pub fail_fast: bool,

    /// Maximum concurrent requests, also used as the worker thread count.
    #[arg(long, env = "FEAST_MAX_PROCESS")]
    pub max_process: Option<usize>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pub pretty: bool,
}

/// Contents of the settings file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub file_path: Option<PathBuf>,
    pub urls: Vec<Url>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
    pub period_secs: Option<u64>,
    pub insecure_skip_verify: bool,
    pub use_os_exit_signal: bool,
    pub max_process: Option<usize>,
    pub failure_policy: FailurePolicy,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let path = std::fs::canonicalize(path).context("Failed to resolve settings path")?;
        let content = std::fs::read_to_string(path).context("Failed to read settings file")?;
        toml::from_str(&content).context("Failed to deserialize settings file")
    }
}

impl Cli {
    /// Merges flags over `settings` into a library configuration.
    pub fn into_configuration(self, settings: Settings) -> anyhow::Result<Configuration> {
        let mut urls = settings.urls;
        for entry in &self.urls {
            let Some((category, link)) = entry.split_once('=') else {
                bail!("Expected CATEGORY=LINK, got '{entry}'");
            };
            urls.push(Url::new(category, link));
        }

        let mut headers = settings.headers;
        for entry in &self.headers {
            let Some((name, value)) = entry.split_once(':') else {
                bail!("Expected NAME:VALUE, got '{entry}'");
            };
            headers.insert(name.trim().to_string(), value.trim().to_string());
        }

        let method = self
            .method
            .or(settings.method)
            .unwrap_or_else(|| "GET".to_string());
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method '{method}'"))?;

        let timeout_ms = self
            .timeout_ms
            .or(settings.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let period_secs = self
            .period_secs
            .or(settings.period_secs)
            .unwrap_or(DEFAULT_PERIOD_SECS);

        let failure_policy = if self.fail_fast {
            FailurePolicy::Abort
        } else {
            settings.failure_policy
        };

        Ok(Configuration {
            urls,
            method,
            headers,
            timeout: Duration::from_millis(timeout_ms),
            period: Some(Duration::from_secs(period_secs)),
            before_eat: None,
            after_eat: None,
            use_os_exit_signal: self.exit_signal || settings.use_os_exit_signal,
            insecure_skip_verify: self.insecure || settings.insecure_skip_verify,
            file_path: self.file.or(settings.file_path),
            max_process: self.max_process.or(settings.max_process).unwrap_or(0),
            failure_policy,
        })
    }
}
