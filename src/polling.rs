// 🔁 Long polling - getUpdates en loop, un task por mensaje
// Ctrl-C o SIGTERM corta el loop y espera a que terminen los handlers en curso.

use crate::bot::ExpenseBot;
use crate::sheets::RowAppender;
use crate::telegram::{TelegramClient, TelegramError, Update};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Wait after a failed getUpdates when Telegram gives no retry_after
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Offset for the next getUpdates call: one past the highest update seen
pub fn next_offset(current: Option<i64>, updates: &[Update]) -> Option<i64> {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .max(current)
}

fn backoff_for(err: &TelegramError) -> Duration {
    err.retry_after().unwrap_or(ERROR_BACKOFF)
}

// ============================================================================
// IN-FLIGHT HANDLERS
// ============================================================================

/// Message handlers still running, so shutdown can wait for them.
///
/// Cheap to clone; clones share the same set.
#[derive(Clone, Default)]
pub struct InFlight {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        // Un panic en otro hilo no invalida el JoinSet
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `task` on the runtime and keep track of it
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        // Reap finished handlers so the set does not grow forever
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every tracked handler to finish
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        if !tasks.is_empty() {
            info!(pending = tasks.len(), "waiting for in-flight messages");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "message handler panicked");
            }
        }
    }
}

// ============================================================================
// SHUTDOWN
// ============================================================================

/// Resolves on Ctrl-C or, on unix, SIGTERM.
///
/// The SIGTERM handler is installed when this is called, not when the future
/// is first polled. Must be called inside the runtime.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send {
    #[cfg(unix)]
    let terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => Some(signal),
        Err(err) => {
            warn!(error = %err, "cannot listen for SIGTERM");
            None
        }
    };

    async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let term = async move {
            let mut terminate = terminate;
            match terminate.as_mut() {
                Some(signal) => {
                    signal.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let term = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Ctrl-C received"),
            _ = term => info!("SIGTERM received"),
        }
    }
}

/// Receive updates until Ctrl-C or SIGTERM
pub async fn run_polling<A>(
    bot: Arc<ExpenseBot<A>>,
    telegram: Arc<TelegramClient>,
    poll_timeout_secs: u32,
) -> Result<()>
where
    A: RowAppender + 'static,
{
    telegram
        .delete_webhook()
        .await
        .context("Failed to remove webhook before polling")?;

    info!(poll_timeout_secs, "polling for messages");

    let mut offset: Option<i64> = None;
    let in_flight = InFlight::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let updates = tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            result = telegram.get_updates(offset, poll_timeout_secs) => result,
        };

        match updates {
            Ok(updates) => {
                offset = next_offset(offset, &updates);
                if !updates.is_empty() {
                    debug!(count = updates.len(), ?offset, "received updates");
                }
                for update in updates {
                    let bot = Arc::clone(&bot);
                    let telegram = Arc::clone(&telegram);
                    in_flight.spawn(async move {
                        bot.dispatch(&telegram, update).await;
                    });
                }
            }
            Err(err) => {
                let wait = backoff_for(&err);
                warn!(error = %err, wait_secs = wait.as_secs(), "getUpdates failed");
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("shutdown requested");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }
    }

    in_flight.drain().await;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn update(id: i64) -> Update {
        Update {
            update_id: id,
            message: None,
        }
    }

    #[test]
    fn test_next_offset() {
        assert_eq!(next_offset(None, &[]), None);
        assert_eq!(next_offset(Some(10), &[]), Some(10));
        assert_eq!(next_offset(None, &[update(5), update(7), update(6)]), Some(8));
        assert_eq!(next_offset(Some(20), &[update(5)]), Some(20));
    }

    #[test]
    fn test_backoff() {
        let flood = TelegramError::Api {
            code: 429,
            description: "Too Many Requests".to_string(),
            retry_after: Some(12),
        };
        assert_eq!(backoff_for(&flood), Duration::from_secs(12));

        let conflict = TelegramError::Api {
            code: 409,
            description: "Conflict".to_string(),
            retry_after: None,
        };
        assert_eq!(backoff_for(&conflict), ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_drain_waits_for_handlers() {
        let in_flight = InFlight::new();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let done = Arc::clone(&done);
            in_flight.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20 * (i + 1))).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(in_flight.len(), 3);

        in_flight.drain().await;

        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_drain_survives_panicking_handler() {
        let in_flight = InFlight::new();
        let done = Arc::new(AtomicUsize::new(0));

        in_flight.spawn(async { panic!("boom") });
        let counter = Arc::clone(&done);
        in_flight.clone().spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        in_flight.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_on_sigterm() {
        // Handler is installed here, so the signal below cannot kill the test
        let shutdown = shutdown_signal();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        assert!(tokio::time::timeout(Duration::from_secs(5), shutdown).await.is_ok());
    }
}
