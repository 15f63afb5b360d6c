//! Signal handling. Kept apart from the other batches: a raised signal
//! reaches every watchdog in the process.

use axum::{Router, extract::State, routing::get};
use feast::{Configuration, FetchError, Url, eat};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{process::Command, sync::Arc, time::Duration};
use tokio::sync::Notify;

const CHILD_ENV: &str = "FEAST_SIGNAL_CHILD";

async fn slow(State(arrived): State<Arc<Notify>>) -> &'static str {
    arrived.notify_one();
    tokio::time::sleep(Duration::from_secs(10)).await;
    "slow"
}

#[tokio::test]
async fn interrupt_cancels_the_batch() {
    let arrived = Arc::new(Notify::new());
    let app = Router::new()
        .route("/slow", get(slow))
        .with_state(arrived.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let config = Configuration {
        urls: vec![Url::new("slow", format!("http://{addr}/slow"))],
        timeout: Duration::from_secs(20),
        use_os_exit_signal: true,
        ..Default::default()
    };
    let batch = tokio::spawn(eat(config));

    arrived.notified().await;
    signal_hook::low_level::raise(SIGINT).unwrap();

    let harvest = tokio::time::timeout(Duration::from_secs(5), batch)
        .await
        .expect("batch should stop on SIGINT")
        .unwrap()
        .unwrap();

    assert!(harvest.interrupted);
    assert!(harvest.feeds.is_empty());
    assert_eq!(harvest.failures.len(), 1);
    assert!(matches!(harvest.failures[0].error, FetchError::Cancelled));
}

/// Runs in a child process: a batch that listened for signals, then SIGTERM.
fn terminate_after_batch() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let harvest = runtime
        .block_on(eat(Configuration {
            urls: vec![Url::new("bad", "not a url")],
            timeout: Duration::from_millis(200),
            use_os_exit_signal: true,
            ..Default::default()
        }))
        .unwrap();
    assert!(!harvest.interrupted);

    signal_hook::low_level::raise(SIGTERM).unwrap();
    std::thread::sleep(Duration::from_secs(2));
}

#[test]
fn sigterm_after_batch_terminates() {
    use std::os::unix::process::ExitStatusExt;

    if std::env::var_os(CHILD_ENV).is_some() {
        terminate_after_batch();
        return;
    }

    let status = Command::new(std::env::current_exe().unwrap())
        .args(["sigterm_after_batch_terminates", "--exact", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .status()
        .unwrap();

    assert_eq!(status.signal(), Some(SIGTERM));
}
