use crate::error::{ErrorCode, HandlerError};
use reqwest::{
    Method,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// A link to fetch, and the category its body is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Url {
    #[serde(rename = "Category", alias = "category", alias = "CATEGORY")]
    pub category: String,
    #[serde(rename = "Link", alias = "link", alias = "LINK")]
    pub link: String,
}

impl Url {
    pub fn new(category: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            link: link.into(),
        }
    }
}

/// A string transformation applied to a link before dispatch, or to a body after receipt.
pub type Hook = Arc<dyn Fn(String) -> String + Send + Sync>;

/// What a failed request does to the rest of the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and keep going.
    #[default]
    Skip,
    /// Cancel every other request and fail the batch.
    Abort,
}

#[derive(Clone, Default)]
pub struct Configuration {
    /// Links to fetch. Loaded from `file_path` when left empty.
    pub urls: Vec<Url>,
    pub method: Method,
    /// Added to every request.
    pub headers: HashMap<String, String>,
    /// Per-request deadline, covering connection setup through the last body byte.
    /// It takes the place of a socket deadline derived from `period`.
    pub timeout: Duration,
    /// Global execution period. Only enforced when `use_os_exit_signal` is set.
    pub period: Option<Duration>,
    pub before_eat: Option<Hook>,
    pub after_eat: Option<Hook>,
    /// Arms the watchdog: SIGINT/SIGTERM and the period both end the batch early.
    pub use_os_exit_signal: bool,
    pub insecure_skip_verify: bool,
    /// JSON array of `{"Category", "Link"}` objects.
    pub file_path: Option<PathBuf>,
    /// Upper bound on requests in flight. Zero means one slot per URL.
    pub max_process: usize,
    pub failure_policy: FailurePolicy,
}

impl Configuration {
    pub fn with_before_eat<F>(mut self, hook: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.before_eat = Some(Arc::new(hook));
        self
    }

    pub fn with_after_eat<F>(mut self, hook: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.after_eat = Some(Arc::new(hook));
        self
    }

    /// Checks the configuration and fills in `urls` from `file_path` if needed.
    ///
    /// Nothing touches the network here.
    pub fn verify(mut self) -> Result<Self, HandlerError> {
        if self.urls.is_empty() {
            if let Some(path) = &self.file_path {
                self.urls = load_urls(path)?;
            }
        }

        if self.urls.is_empty() {
            return Err(HandlerError::new(
                ErrorCode::MissingUrls,
                "You must provide a list of urls to eat",
            ));
        }

        if self.timeout.is_zero() {
            return Err(HandlerError::new(
                ErrorCode::MissingTimeout,
                "You must provide the request timeout",
            ));
        }

        self.header_map()?;

        tracing::debug!(
            "Configuration verified: {} urls, timeout {:?}",
            self.urls.len(),
            self.timeout
        );
        Ok(self)
    }

    /// True when the deadline timer should run alongside the fetch.
    pub fn deadline_armed(&self) -> bool {
        self.use_os_exit_signal
            && !self.timeout.is_zero()
            && self.period.is_some_and(|period| !period.is_zero())
    }

    /// Converts the configured headers into a typed header map.
    pub fn header_map(&self) -> Result<HeaderMap, HandlerError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                HandlerError::with_cause(
                    ErrorCode::ConfigurationVerification,
                    format!("Invalid header name '{name}'"),
                    e,
                )
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                HandlerError::with_cause(
                    ErrorCode::ConfigurationVerification,
                    format!("Invalid value for header '{name}'"),
                    e,
                )
            })?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("urls", &self.urls)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("period", &self.period)
            .field("before_eat", &self.before_eat.is_some())
            .field("after_eat", &self.after_eat.is_some())
            .field("use_os_exit_signal", &self.use_os_exit_signal)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("file_path", &self.file_path)
            .field("max_process", &self.max_process)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

/// Reads a URL list file: its lines, joined by spaces, form one JSON array.
pub fn load_urls(path: &Path) -> Result<Vec<Url>, HandlerError> {
    let file = File::open(path).map_err(|e| {
        HandlerError::with_cause(
            ErrorCode::FileOpen,
            format!("Unable to open {} for read", path.display()),
            e,
        )
    })?;

    let lines = BufReader::new(file)
        .lines()
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| {
            HandlerError::with_cause(
                ErrorCode::FileRead,
                format!("Error reading {}", path.display()),
                e,
            )
        })?;

    let urls: Vec<Url> = serde_json::from_str(&lines.join(" ")).map_err(|e| {
        HandlerError::with_cause(
            ErrorCode::JsonUnmarshal,
            format!("Unable to parse url list in {}", path.display()),
            e,
        )
    })?;

    if urls.is_empty() {
        return Err(HandlerError::new(
            ErrorCode::EmptyUrlFile,
            format!("No urls listed in {}", path.display()),
        ));
    }

    tracing::debug!("Loaded {} urls from {}", urls.len(), path.display());
    Ok(urls)
}
