//! Concurrent fetch of every configured URL.

use crate::{
    client::build_client,
    config::{Configuration, FailurePolicy, Url},
    error::{ErrorCode, FetchError, HandlerError},
    storage::{Failure, Feeds, Harvest},
    watchdog::Watchdog,
};
use reqwest::{Client, header::HeaderMap};
use std::sync::Arc;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

/// Verifies `config`, fetches every URL and returns what came back.
///
/// Per-request failures never fail the batch under [`FailurePolicy::Skip`];
/// they are listed in [`Harvest::failures`]. When the watchdog fires, the
/// entries stored so far are returned with [`Harvest::interrupted`] set.
pub async fn eat(config: Configuration) -> Result<Harvest, HandlerError> {
    eat_until(config, CancellationToken::new()).await
}

/// Like [`eat`], but the caller may also end the batch early through `token`.
pub async fn eat_until(
    config: Configuration,
    token: CancellationToken,
) -> Result<Harvest, HandlerError> {
    let config = config.verify()?;

    let _watchdog = Watchdog::arm(&config, token.clone()).map_err(|e| {
        HandlerError::with_cause(
            ErrorCode::ConfigurationVerification,
            "Unable to register signal handlers",
            e,
        )
    })?;

    let feeds = Feeds::new();
    let fetcher = FeedFetcher::new(config, feeds.clone(), token)?;
    let interrupted = fetcher.launch().await?;

    let harvest = feeds.drain(interrupted).await;
    tracing::info!(
        "Batch finished with {} entries in {} categories, {} failures",
        harvest.entry_count(),
        harvest.feeds.len(),
        harvest.failures.len()
    );
    Ok(harvest)
}

/// How a single fetch task ended.
enum Outcome {
    Stored,
    Failed,
    Cancelled,
    Aborted(FetchError),
}

/// Fans out one task per URL and joins them all.
#[derive(Clone)]
pub struct FeedFetcher {
    config: Arc<Configuration>,
    client: Client,
    headers: Arc<HeaderMap>,
    feeds: Feeds,
    token: CancellationToken,
    permits: Arc<Semaphore>,
}

impl FeedFetcher {
    /// Expects a configuration that already passed [`Configuration::verify`].
    pub fn new(
        config: Configuration,
        feeds: Feeds,
        token: CancellationToken,
    ) -> Result<Self, HandlerError> {
        let headers = config.header_map()?;
        let client = build_client(&config).map_err(|e| {
            HandlerError::with_cause(
                ErrorCode::ConfigurationVerification,
                "Unable to build the HTTP client",
                FetchError::from(e),
            )
        })?;

        let slots = match config.max_process {
            0 => config.urls.len().max(1),
            limit => limit,
        }
        .min(Semaphore::MAX_PERMITS);

        Ok(Self {
            config: Arc::new(config),
            client,
            headers: Arc::new(headers),
            feeds,
            token,
            permits: Arc::new(Semaphore::new(slots)),
        })
    }

    /// Runs every fetch to completion or cancellation.
    ///
    /// Returns whether any request was cut short by cancellation.
    pub async fn launch(&self) -> Result<bool, HandlerError> {
        tracing::info!(
            "Fetching {} urls, {} at a time",
            self.config.urls.len(),
            self.permits.available_permits()
        );

        let mut tasks = JoinSet::new();
        for url in self.config.urls.iter().cloned() {
            tasks.spawn(self.clone().eat_one(url));
        }

        let mut interrupted = false;
        let mut aborted = None;
        let mut fault = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Stored | Outcome::Failed) => {}
                Ok(Outcome::Cancelled) => interrupted = true,
                Ok(Outcome::Aborted(error)) => {
                    aborted.get_or_insert(error);
                }
                Err(error) => {
                    tracing::error!("Fetch task faulted: {error}");
                    self.token.cancel();
                    fault.get_or_insert(error);
                }
            }
        }

        if let Some(error) = fault {
            return Err(HandlerError::with_cause(
                ErrorCode::TaskFault,
                "A fetch task faulted, batch abandoned",
                error,
            ));
        }
        if let Some(error) = aborted {
            return Err(HandlerError::with_cause(
                ErrorCode::FetchAborted,
                "A request failed, batch aborted",
                error,
            ));
        }
        Ok(interrupted)
    }

    async fn eat_one(self, url: Url) -> Outcome {
        let _permit = tokio::select! {
            _ = self.token.cancelled() => return Outcome::Cancelled,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Outcome::Cancelled,
            },
        };

        let Url { category, link } = url;

        // The hook may point the request anywhere; the result is not checked.
        let target = match &self.config.before_eat {
            Some(hook) => hook(link),
            None => link,
        };

        let result = tokio::select! {
            _ = self.token.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_body(&target) => result,
        };

        match result {
            Ok(body) => {
                let body = match &self.config.after_eat {
                    Some(hook) => hook(body),
                    None => body,
                };
                self.feeds.store(&category, body).await;
                Outcome::Stored
            }
            Err(FetchError::Cancelled) => {
                tracing::debug!("Fetch of {target} cancelled");
                self.record_failure(category, target, FetchError::Cancelled).await;
                Outcome::Cancelled
            }
            Err(error) => {
                tracing::warn!("Failed to fetch {target} for {category}: {error}");
                if self.config.failure_policy == FailurePolicy::Abort {
                    self.token.cancel();
                    return Outcome::Aborted(error);
                }
                self.record_failure(category, target, error).await;
                Outcome::Failed
            }
        }
    }

    async fn fetch_body(&self, target: &str) -> Result<String, FetchError> {
        tracing::debug!("{} {target}", self.config.method);

        // An unparsable target surfaces here, from `send`.
        let response = self
            .client
            .request(self.config.method.clone(), target)
            .headers((*self.headers).clone())
            .send()
            .await?;
        tracing::debug!("{target} answered {}", response.status());

        Ok(response.text().await?)
    }

    async fn record_failure(&self, category: String, link: String, error: FetchError) {
        self.feeds
            .record_failure(Failure {
                category,
                link,
                error,
            })
            .await;
    }
}
