//! Global deadline and signal handling.
//!
//! The watchdog never kills the process. It cancels the batch token, and the
//! fetch tasks wind down on their own. Outside of a batch, SIGINT and SIGTERM
//! keep their default action.

use crate::config::Configuration;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EXIT_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// Once registered, signal-hook handlers stay installed for the life of the
/// process. A conditional default action sits next to them and is enabled
/// whenever no watchdog is listening.
struct DefaultAction {
    enabled: Option<Arc<AtomicBool>>,
    listeners: usize,
}

static DEFAULT_ACTION: Mutex<DefaultAction> = Mutex::new(DefaultAction {
    enabled: None,
    listeners: 0,
});

fn suspend_default_action() -> std::io::Result<()> {
    let mut action = DEFAULT_ACTION.lock().unwrap_or_else(PoisonError::into_inner);
    let enabled = match action.enabled.clone() {
        Some(enabled) => enabled,
        None => {
            let enabled = Arc::new(AtomicBool::new(false));
            for signal in EXIT_SIGNALS {
                signal_hook::flag::register_conditional_default(signal, Arc::clone(&enabled))?;
            }
            action.enabled = Some(Arc::clone(&enabled));
            enabled
        }
    };
    action.listeners += 1;
    enabled.store(false, Ordering::SeqCst);
    Ok(())
}

fn resume_default_action() {
    let mut action = DEFAULT_ACTION.lock().unwrap_or_else(PoisonError::into_inner);
    action.listeners = action.listeners.saturating_sub(1);
    if action.listeners == 0 {
        if let Some(enabled) = &action.enabled {
            enabled.store(true, Ordering::SeqCst);
        }
    }
}

/// Why the watchdog fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Deadline,
    Signal(i32),
}

pub struct Watchdog {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    signals: Option<Handle>,
}

impl Watchdog {
    /// Starts the deadline timer and signal listener that `config` asks for.
    ///
    /// Both stop when the watchdog is dropped.
    pub fn arm(config: &Configuration, token: CancellationToken) -> std::io::Result<Self> {
        let mut watchdog = Self {
            token,
            tasks: Vec::new(),
            signals: None,
        };

        if config.use_os_exit_signal {
            watchdog.listen_for_signals()?;
        }

        if config.deadline_armed() {
            if let Some(period) = config.period {
                watchdog.start_deadline(period);
            }
        }

        Ok(watchdog)
    }

    fn start_deadline(&mut self, period: Duration) {
        tracing::debug!("Deadline armed for {:?}", period);
        let token = self.token.clone();
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(period) => fire(&token, Trigger::Deadline),
            }
        }));
    }

    fn listen_for_signals(&mut self) -> std::io::Result<()> {
        suspend_default_action()?;
        let mut signals = match Signals::new(EXIT_SIGNALS) {
            Ok(signals) => signals,
            Err(error) => {
                resume_default_action();
                return Err(error);
            }
        };
        self.signals = Some(signals.handle());

        let token = self.token.clone();
        self.tasks.push(tokio::spawn(async move {
            // Ends when the handle is closed.
            if let Some(signal) = signals.next().await {
                fire(&token, Trigger::Signal(signal));
            }
        }));
        Ok(())
    }
}

fn fire(token: &CancellationToken, trigger: Trigger) {
    match trigger {
        Trigger::Deadline => tracing::info!("Execution period elapsed, cancelling the batch"),
        Trigger::Signal(signal) => tracing::info!("Received signal {signal}, cancelling the batch"),
    }
    token.cancel();
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(handle) = self.signals.take() {
            handle.close();
            resume_default_action();
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Url;

    fn config(use_os_exit_signal: bool, period: Option<Duration>) -> Configuration {
        Configuration {
            urls: vec![Url::new("a", "http://a")],
            timeout: Duration::from_millis(100),
            period,
            use_os_exit_signal,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deadline_cancels_the_token() {
        let token = CancellationToken::new();
        let config = config(true, Some(Duration::from_millis(50)));
        let _watchdog = Watchdog::arm(&config, token.clone()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("deadline should have fired");
    }

    #[tokio::test]
    async fn disarmed_without_signal_flag() {
        let token = CancellationToken::new();
        let config = config(false, Some(Duration::from_millis(20)));
        let watchdog = Watchdog::arm(&config, token.clone()).unwrap();
        assert!(watchdog.tasks.is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_stops_the_timer() {
        let token = CancellationToken::new();
        let config = config(true, Some(Duration::from_millis(50)));
        let watchdog = Watchdog::arm(&config, token.clone()).unwrap();
        drop(watchdog);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!token.is_cancelled());
    }
}
