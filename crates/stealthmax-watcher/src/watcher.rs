//! The block watch loop.
//!
//! Polls the chain head, scans every new block in order, and hands each
//! matched transfer to the [`TransferSink`] one at a time. A block counts
//! as processed only once every transfer in it was handled, so an error
//! mid-block leaves the cursor in place and the block is scanned again on
//! the next run. [`SeenTransactions`] keeps the re-scan from settling a
//! transaction twice.

use std::sync::Arc;

use stealthmax_types::{Result, SettlementOutcome, StealthError, WatcherConfig};
use tokio::sync::watch;

use crate::chain::ChainSource;
use crate::replay::{Claim, SeenTransactions};
use crate::sink::TransferSink;
use crate::snapshot::{AddressBook, match_transfers};

/// Counters exposed for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub blocks_scanned: u64,
    pub transfers_matched: u64,
    pub transfers_settled: u64,
    pub replays_skipped: u64,
}

pub struct BlockWatcher {
    chain: Arc<dyn ChainSource>,
    book: AddressBook,
    sink: Arc<dyn TransferSink>,
    seen: SeenTransactions,
    config: WatcherConfig,
    /// Last fully processed block.
    cursor: Option<u64>,
    stats: WatchStats,
}

impl BlockWatcher {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        book: AddressBook,
        sink: Arc<dyn TransferSink>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            chain,
            book,
            sink,
            seen: SeenTransactions::new(config.replay_cache_size),
            config,
            cursor: None,
            stats: WatchStats::default(),
        }
    }

    /// Start after `block` instead of at the current head.
    #[must_use]
    pub fn starting_after(mut self, block: u64) -> Self {
        self.cursor = Some(block);
        self
    }

    #[must_use]
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    #[must_use]
    pub fn stats(&self) -> WatchStats {
        self.stats
    }

    /// Poll until `shutdown` flips to `true`.
    ///
    /// Shutdown is observed between blocks; a block in progress always
    /// finishes first.
    ///
    /// # Errors
    /// The first transport, decode or sink error. The cursor stays at the
    /// last fully processed block.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(cursor = ?self.cursor, poll_interval = ?self.config.poll_interval, "Block watcher started");
        loop {
            if *shutdown.borrow() {
                tracing::info!(cursor = ?self.cursor, "Block watcher stopping");
                return Ok(());
            }
            self.poll_once(&shutdown).await?;
            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("Shutdown channel closed, block watcher stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One catch-up pass: scan from the cursor to the head, at most
    /// `max_catch_up_blocks` blocks. Returns the number of blocks scanned.
    ///
    /// # Errors
    /// As for [`run`](Self::run).
    pub async fn poll_once(&mut self, shutdown: &watch::Receiver<bool>) -> Result<u64> {
        let head = self.chain.latest_block().await?;
        let from = match self.cursor {
            Some(cursor) => cursor + 1,
            None => head,
        };
        if head < from {
            return Ok(0);
        }
        let to = head.min(from + self.config.max_catch_up_blocks.max(1) - 1);
        if to < head {
            tracing::warn!(from, to, head, "Behind chain head, catching up");
        }

        let mut scanned = 0;
        for number in from..=to {
            if *shutdown.borrow() {
                break;
            }
            self.process_block(number).await?;
            self.cursor = Some(number);
            scanned += 1;
        }
        Ok(scanned)
    }

    async fn process_block(&mut self, number: u64) -> Result<()> {
        let block = self
            .chain
            .block(number)
            .await?
            .ok_or_else(|| StealthError::Transport(format!("block {number} not available")))?;
        let snapshot = self.book.snapshot();
        let matched = match_transfers(&block, &snapshot);
        self.stats.blocks_scanned += 1;
        tracing::debug!(block = number, txs = block.transactions.len(), matched = matched.len(), "Block scanned");

        for transfer in matched {
            self.stats.transfers_matched += 1;
            if let Claim::Seen { block } = self.seen.claim(transfer.tx_hash, number) {
                self.stats.replays_skipped += 1;
                tracing::debug!(tx_hash = %transfer.tx_hash, first_seen = block, block = number, "Transfer already handled, skipping");
                continue;
            }
            let monitored_as = snapshot.name_of(&transfer.recipient);
            tracing::info!(
                name = monitored_as.unwrap_or_default(),
                to = %transfer.recipient,
                from = %transfer.sender,
                amount = %transfer.amount.format_ether(),
                tx_hash = %transfer.tx_hash,
                block = number,
                "ETH received"
            );

            let outcome = match self.sink.on_transfer(&transfer, monitored_as).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.seen.release(&transfer.tx_hash);
                    return Err(err);
                }
            };
            self.stats.transfers_settled += 1;

            if let SettlementOutcome::Settled(result) = &outcome {
                if let Some(rotation) = &result.rotation {
                    self.book.insert(&result.name, rotation.address);
                }
            }
        }
        Ok(())
    }
}
