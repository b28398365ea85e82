//! Periodic reload of the monitored-address set.

use std::sync::Arc;
use std::time::Duration;

use stealthmax_directory::NameDirectory;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::snapshot::AddressBook;

/// Reload `book` from `directory` every `interval` until shutdown.
///
/// The first tick fires after one full interval; callers are expected to
/// have refreshed once at startup. A failed refresh keeps the previous
/// snapshot.
pub fn spawn_refresher(
    book: AddressBook,
    directory: Arc<dyn NameDirectory>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = book.refresh(directory.as_ref()).await {
                        tracing::warn!(error = %err, "Monitored address refresh failed, keeping previous set");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Address refresher stopping");
                        return;
                    }
                }
            }
        }
    })
}
