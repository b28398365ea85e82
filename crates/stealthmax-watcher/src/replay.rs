//! Transactions the watcher has already handed off.
//!
//! A block whose processing failed halfway is scanned again after a
//! restart. Before offering a transfer to the sink the watcher claims its
//! hash here; a claim that fails to settle is released so the re-scan can
//! offer it again. Claims are kept for the most recent `capacity` hashes.

use std::collections::{HashMap, VecDeque};

use stealthmax_types::TxHash;

/// Result of [`SeenTransactions::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Not seen before; the caller now owns the transfer.
    Fresh,
    /// Already claimed while scanning `block`.
    Seen { block: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    block: u64,
    seq: u64,
}

/// Bounded record of claimed transaction hashes, oldest claim evicted first.
#[derive(Debug)]
pub struct SeenTransactions {
    claims: HashMap<TxHash, Entry>,
    /// Claim order; entries whose `seq` no longer matches were released.
    order: VecDeque<(TxHash, u64)>,
    capacity: usize,
    next_seq: u64,
}

impl SeenTransactions {
    /// Remember at most `capacity` claims (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            claims: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            next_seq: 0,
        }
    }

    /// Claim `tx`, first seen in `block`.
    pub fn claim(&mut self, tx: TxHash, block: u64) -> Claim {
        if let Some(entry) = self.claims.get(&tx) {
            return Claim::Seen { block: entry.block };
        }
        while self.claims.len() >= self.capacity {
            let Some((oldest, seq)) = self.order.pop_front() else {
                break;
            };
            if self.claims.get(&oldest).is_some_and(|e| e.seq == seq) {
                self.claims.remove(&oldest);
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.claims.insert(tx, Entry { block, seq });
        self.order.push_back((tx, seq));
        Claim::Fresh
    }

    /// Give up the claim on `tx` so a later scan may offer it again.
    pub fn release(&mut self, tx: &TxHash) {
        self.claims.remove(tx);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(n: u8) -> TxHash {
        TxHash([n; 32])
    }

    #[test]
    fn second_claim_reports_original_block() {
        let mut seen = SeenTransactions::new(8);
        assert_eq!(seen.claim(tx(1), 40), Claim::Fresh);
        assert_eq!(seen.claim(tx(1), 41), Claim::Seen { block: 40 });
        assert_eq!(seen.claim(tx(2), 41), Claim::Fresh);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn released_claim_can_be_taken_again() {
        let mut seen = SeenTransactions::new(8);
        seen.claim(tx(1), 7);
        seen.release(&tx(1));
        assert!(seen.is_empty());
        assert_eq!(seen.claim(tx(1), 7), Claim::Fresh);
    }

    #[test]
    fn oldest_claim_is_evicted_at_capacity() {
        let mut seen = SeenTransactions::new(2);
        seen.claim(tx(1), 1);
        seen.claim(tx(2), 1);
        seen.claim(tx(3), 2);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.claim(tx(1), 3), Claim::Fresh);
        assert_eq!(seen.claim(tx(3), 3), Claim::Seen { block: 2 });
    }

    #[test]
    fn stale_order_entry_does_not_evict_a_reclaim() {
        let mut seen = SeenTransactions::new(2);
        seen.claim(tx(1), 1);
        seen.release(&tx(1));
        seen.claim(tx(1), 1);
        seen.claim(tx(2), 1);
        // The released copy of tx 1 is skipped and the live one evicted.
        seen.claim(tx(3), 2);
        assert_eq!(seen.claim(tx(2), 2), Claim::Seen { block: 1 });
        assert_eq!(seen.claim(tx(3), 2), Claim::Seen { block: 2 });
    }
}
