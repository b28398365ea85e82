//! Where matched transfers go.

use async_trait::async_trait;
use stealthmax_settlement::SettlementOrchestrator;
use stealthmax_types::{MatchedTransfer, Result, SettlementOutcome};

/// Consumer of matched transfers.
///
/// `monitored_as` is the name the recipient belonged to in the snapshot
/// the block was matched against. An earlier transfer in the same block may
/// already have rotated that name away from the recipient.
///
/// An `Err` means the transfer was not handled and may be offered again;
/// the watcher then stops advancing and lets its supervisor restart it.
#[async_trait]
pub trait TransferSink: Send + Sync {
    async fn on_transfer(
        &self,
        transfer: &MatchedTransfer,
        monitored_as: Option<&str>,
    ) -> Result<SettlementOutcome>;
}

#[async_trait]
impl TransferSink for SettlementOrchestrator {
    async fn on_transfer(
        &self,
        transfer: &MatchedTransfer,
        monitored_as: Option<&str>,
    ) -> Result<SettlementOutcome> {
        self.settle_monitored(transfer, monitored_as).await
    }
}
