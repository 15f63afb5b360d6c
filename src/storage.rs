use crate::error::FetchError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A URL that produced no entry, and why.
#[derive(Debug, Serialize)]
pub struct Failure {
    pub category: String,
    pub link: String,
    #[serde(serialize_with = "as_display")]
    pub error: FetchError,
}

fn as_display<S>(error: &FetchError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(error)
}

/// The outcome of one batch.
#[derive(Debug, Default, Serialize)]
pub struct Harvest {
    /// Bodies per category, in the order they were stored.
    pub feeds: HashMap<String, Vec<String>>,
    pub failures: Vec<Failure>,
    /// Set when the watchdog ended the batch before every request finished.
    pub interrupted: bool,
}

impl Harvest {
    pub fn entry_count(&self) -> usize {
        self.feeds.values().map(Vec::len).sum()
    }
}

#[derive(Default)]
struct Store {
    feeds: HashMap<String, Vec<String>>,
    failures: Vec<Failure>,
}

/// Category to bodies mapping shared by every fetch task of a batch.
///
/// Clones share the same underlying store. Every write holds the one lock.
#[derive(Clone, Default)]
pub struct Feeds {
    store: Arc<Mutex<Store>>,
}

impl Feeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, category: &str, body: String) {
        use std::collections::hash_map::Entry;

        let mut store = self.store.lock().await;
        match store.feeds.entry(category.to_string()) {
            Entry::Occupied(mut entry) => entry.get_mut().push(body),
            Entry::Vacant(entry) => {
                entry.insert(vec![body]);
            }
        }
    }

    pub async fn record_failure(&self, failure: Failure) {
        self.store.lock().await.failures.push(failure);
    }

    /// Takes everything stored so far, leaving the store empty.
    pub async fn drain(&self, interrupted: bool) -> Harvest {
        let mut store = self.store.lock().await;
        let Store { feeds, failures } = std::mem::take(&mut *store);
        Harvest {
            feeds,
            failures,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_per_category_without_dedup() {
        let feeds = Feeds::new();
        feeds.store("news", "a".into()).await;
        feeds.store("news", "a".into()).await;
        feeds.store("sport", "b".into()).await;

        let harvest = feeds.drain(false).await;
        assert_eq!(harvest.feeds["news"], vec!["a", "a"]);
        assert_eq!(harvest.feeds["sport"], vec!["b"]);
        assert_eq!(harvest.entry_count(), 3);
        assert!(!harvest.interrupted);
    }

    #[tokio::test]
    async fn clones_share_one_store() {
        let feeds = Feeds::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let feeds = feeds.clone();
            handles.push(tokio::spawn(async move {
                feeds.store(&format!("c{}", i % 4), i.to_string()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let harvest = feeds.drain(false).await;
        assert_eq!(harvest.entry_count(), 32);
        assert_eq!(harvest.feeds.len(), 4);
        assert!(harvest.feeds.values().all(|bodies| bodies.len() == 8));
    }

    #[tokio::test]
    async fn failures_are_kept_apart() {
        let feeds = Feeds::new();
        feeds
            .record_failure(Failure {
                category: "news".into(),
                link: "http://x".into(),
                error: FetchError::Cancelled,
            })
            .await;

        let harvest = feeds.drain(true).await;
        assert!(harvest.feeds.is_empty());
        assert_eq!(harvest.failures.len(), 1);
        assert!(harvest.interrupted);

        let json = serde_json::to_value(&harvest).unwrap();
        assert_eq!(json["failures"][0]["error"], "cancelled before completion");
    }

    #[tokio::test]
    async fn drain_empties_the_store() {
        let feeds = Feeds::new();
        feeds.store("news", "a".into()).await;
        assert_eq!(feeds.drain(false).await.entry_count(), 1);
        assert_eq!(feeds.drain(false).await.entry_count(), 0);
    }
}
