//! Concurrent fetch of categorized URLs.
//!
//! [`eat`] verifies a [`Configuration`], requests every URL at once (bounded by
//! `max_process`), passes links and bodies through the optional hooks, and
//! groups the bodies by category.

pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod storage;
pub mod watchdog;

pub use config::{Configuration, FailurePolicy, Hook, Url, load_urls};
pub use error::{ErrorCode, FetchError, HandlerError};
pub use fetcher::{FeedFetcher, eat, eat_until};
pub use storage::{Failure, Feeds, Harvest};
pub use watchdog::Watchdog;
