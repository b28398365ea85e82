//! Restart-on-error for the block watcher.

use std::time::Duration;

use stealthmax_types::WatcherConfig;
use tokio::sync::watch;

use crate::watcher::BlockWatcher;

/// Why [`Supervisor::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The shutdown signal was raised.
    Shutdown,
    /// `max_restarts` consecutive failures without progress.
    GaveUp { failures: u32, last_error: String },
}

/// Keeps a [`BlockWatcher`] running across transport errors.
///
/// After a failure the supervisor waits `restart_delay` and runs the same
/// watcher again, so its cursor and seen transactions carry over. Failures are
/// counted consecutively; a restart that scans at least one block resets
/// the count.
#[derive(Debug, Clone)]
pub struct Supervisor {
    restart_delay: Duration,
    max_restarts: Option<u32>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: &WatcherConfig) -> Self {
        Self {
            restart_delay: config.restart_delay,
            max_restarts: config.max_restarts,
        }
    }

    pub async fn run(
        &self,
        watcher: &mut BlockWatcher,
        mut shutdown: watch::Receiver<bool>,
    ) -> SupervisorExit {
        let mut failures = 0u32;
        let mut scanned_at_failure = watcher.stats().blocks_scanned;
        loop {
            let err = match watcher.run(shutdown.clone()).await {
                Ok(()) => return SupervisorExit::Shutdown,
                Err(err) => err,
            };

            let scanned = watcher.stats().blocks_scanned;
            if scanned > scanned_at_failure {
                failures = 0;
            }
            scanned_at_failure = scanned;
            failures += 1;

            if self.max_restarts.is_some_and(|max| failures > max) {
                tracing::error!(failures, error = %err, "Block watcher keeps failing, giving up");
                return SupervisorExit::GaveUp {
                    failures,
                    last_error: err.to_string(),
                };
            }
            tracing::error!(
                failures,
                error = %err,
                cursor = ?watcher.cursor(),
                delay = ?self.restart_delay,
                "Block watching error, restarting monitoring"
            );

            tokio::select! {
                () = tokio::time::sleep(self.restart_delay) => {
                    tracing::info!(cursor = ?watcher.cursor(), "Restarting block watcher");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return SupervisorExit::Shutdown;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use stealthmax_types::{MatchedTransfer, Result, SettlementOutcome};

    use super::*;
    use crate::chain::{ChainBlock, ScriptedChain};
    use crate::sink::TransferSink;
    use crate::snapshot::AddressBook;

    struct NullSink;

    #[async_trait]
    impl TransferSink for NullSink {
        async fn on_transfer(
            &self,
            transfer: &MatchedTransfer,
            _monitored_as: Option<&str>,
        ) -> Result<SettlementOutcome> {
            Ok(SettlementOutcome::Unassociated {
                recipient: transfer.recipient,
            })
        }
    }

    fn config(max_restarts: Option<u32>) -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(5),
            restart_delay: Duration::from_millis(5),
            max_restarts,
            ..WatcherConfig::default()
        }
    }

    fn watcher(chain: Arc<ScriptedChain>, config: &WatcherConfig) -> BlockWatcher {
        BlockWatcher::new(chain, AddressBook::new(), Arc::new(NullSink), config.clone())
    }

    #[tokio::test]
    async fn gives_up_after_max_restarts() {
        let chain = Arc::new(ScriptedChain::new());
        chain.fail_next(u32::MAX);
        let config = config(Some(2));
        let mut watcher = watcher(chain, &config);
        let (_tx, rx) = watch::channel(false);

        let exit = Supervisor::new(&config).run(&mut watcher, rx).await;
        assert!(matches!(exit, SupervisorExit::GaveUp { failures: 3, .. }));
    }

    #[tokio::test]
    async fn restarts_and_resumes_after_transport_errors() {
        let chain = Arc::new(ScriptedChain::new());
        chain.push(ChainBlock {
            number: 3,
            transactions: Vec::new(),
        });
        chain.fail_next(2);
        let config = config(Some(5));
        let mut watcher = watcher(chain, &config);
        let (tx, rx) = watch::channel(false);

        let supervisor = Supervisor::new(&config);
        let run = supervisor.run(&mut watcher, rx);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
        };
        let (exit, ()) = tokio::join!(run, stop);

        assert_eq!(exit, SupervisorExit::Shutdown);
        assert_eq!(watcher.cursor(), Some(3));
    }

    #[tokio::test]
    async fn shutdown_interrupts_backoff() {
        let chain = Arc::new(ScriptedChain::new());
        chain.fail_next(u32::MAX);
        let config = WatcherConfig {
            restart_delay: Duration::from_secs(3600),
            ..config(None)
        };
        let mut watcher = watcher(chain, &config);
        let (tx, rx) = watch::channel(false);

        let supervisor = Supervisor::new(&config);
        let run = supervisor.run(&mut watcher, rx);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        };
        let (exit, ()) = tokio::join!(run, stop);
        assert_eq!(exit, SupervisorExit::Shutdown);
    }
}
