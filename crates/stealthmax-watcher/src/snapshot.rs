//! The monitored-address set.
//!
//! Readers take an `Arc<AddressSnapshot>` and match against it without
//! holding any lock. Writers build a complete new snapshot and publish it
//! through a `tokio::sync::watch` channel, so a reader sees either the old
//! set or the new one, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stealthmax_directory::NameDirectory;
use stealthmax_types::{Address, MatchedTransfer, NameRecord, Result};
use tokio::sync::watch;

use crate::chain::ChainBlock;

/// Immutable view of monitored receiving addresses.
#[derive(Debug, Clone)]
pub struct AddressSnapshot {
    /// Receiving address -> name.
    names: HashMap<Address, String>,
    /// Name -> (address, version) for every [`AddressBook::insert`] since
    /// the last full reload.
    inserted: HashMap<String, (Address, u64)>,
    /// Bumped on every publish.
    pub version: u64,
    pub refreshed_at: DateTime<Utc>,
}

impl AddressSnapshot {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            names: HashMap::new(),
            inserted: HashMap::new(),
            version: 0,
            refreshed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a NameRecord>) -> Self {
        Self {
            names: records
                .into_iter()
                .map(|r| (r.receiving_address, r.name.clone()))
                .collect(),
            inserted: HashMap::new(),
            version: 0,
            refreshed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.names.contains_key(address)
    }

    #[must_use]
    pub fn name_of(&self, address: &Address) -> Option<&str> {
        self.names.get(address).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Monitored addresses, sorted.
    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        let mut out: Vec<_> = self.names.keys().copied().collect();
        out.sort();
        out
    }
}

/// Native transfers in `block` to monitored addresses, in block order.
///
/// Zero-value transactions and contract creations are ignored.
#[must_use]
pub fn match_transfers(block: &ChainBlock, snapshot: &AddressSnapshot) -> Vec<MatchedTransfer> {
    block
        .transactions
        .iter()
        .filter(|tx| !tx.value.is_zero())
        .filter_map(|tx| {
            let to = tx.to?;
            snapshot.contains(&to).then(|| MatchedTransfer {
                recipient: to,
                sender: tx.from,
                amount: tx.value,
                tx_hash: tx.hash,
                block_number: block.number,
            })
        })
        .collect()
}

/// Owner of the current [`AddressSnapshot`].
#[derive(Clone)]
pub struct AddressBook {
    tx: Arc<watch::Sender<Arc<AddressSnapshot>>>,
}

impl Default for AddressBook {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressBook {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(AddressSnapshot::empty()));
        Self { tx: Arc::new(tx) }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<AddressSnapshot> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every publish.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<AddressSnapshot>> {
        self.tx.subscribe()
    }

    /// Publish a snapshot built from `records`, replacing the current one.
    pub fn replace<'a>(&self, records: impl IntoIterator<Item = &'a NameRecord>) {
        self.publish(records, None);
    }

    /// Publish a snapshot built from `records`, read while `based_on` was
    /// current. Inserts made after `based_on` are newer than the records
    /// and are carried into the new snapshot.
    fn publish<'a>(
        &self,
        records: impl IntoIterator<Item = &'a NameRecord>,
        based_on: Option<u64>,
    ) {
        let mut next = AddressSnapshot::from_records(records);
        self.tx.send_modify(|current| {
            if let Some(base) = based_on {
                for (name, &(address, version)) in &current.inserted {
                    if version > base {
                        tracing::debug!(name = %name, %address, "Keeping rotation newer than the reload");
                        next.names.retain(|_, n| n != name);
                        next.names.insert(address, name.clone());
                        next.inserted.insert(name.clone(), (address, version));
                    }
                }
            }
            next.version = current.version + 1;
            *current = Arc::new(next);
        });
    }

    /// Point `name` at `address`, retiring whatever address it had.
    pub fn insert(&self, name: &str, address: Address) {
        self.tx.send_modify(|current| {
            let mut next = (**current).clone();
            next.names.retain(|_, n| n != name);
            next.names.insert(address, name.to_string());
            next.version += 1;
            next.inserted.insert(name.to_string(), (address, next.version));
            *current = Arc::new(next);
        });
    }

    /// Reload every managed record from `directory`.
    ///
    /// An [`insert`](Self::insert) that lands while the directory is being
    /// read survives the reload. On error the current snapshot stays in
    /// place.
    ///
    /// # Errors
    /// Whatever `directory.list()` returns.
    pub async fn refresh(&self, directory: &dyn NameDirectory) -> Result<usize> {
        let based_on = self.snapshot().version;
        let records = directory.list().await?;
        self.publish(&records, Some(based_on));
        let snapshot = self.snapshot();
        tracing::info!(
            count = snapshot.len(),
            version = snapshot.version,
            "Monitored addresses refreshed"
        );
        Ok(snapshot.len())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use stealthmax_directory::{CasOutcome, InMemoryDirectory};
    use stealthmax_types::{NativeAmount, TxHash};

    use super::*;
    use crate::chain::ChainTransaction;

    fn tx(n: u8, to: Option<Address>, wei: u128) -> ChainTransaction {
        ChainTransaction {
            hash: TxHash([n; 32]),
            from: Address([0xf0; 20]),
            to,
            value: NativeAmount::from_wei(wei),
        }
    }

    #[test]
    fn matches_only_monitored_nonzero_transfers_in_order() {
        let alice = NameRecord::dummy("alice");
        let snapshot = AddressSnapshot::from_records([&alice]);
        let target = alice.receiving_address;
        let block = ChainBlock {
            number: 9,
            transactions: vec![
                tx(1, Some(target), 5),
                tx(2, Some(Address([0x01; 20])), 5),
                tx(3, Some(target), 0),
                tx(4, None, 5),
                tx(5, Some(target), 7),
            ],
        };
        let matched = match_transfers(&block, &snapshot);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].tx_hash, TxHash([1; 32]));
        assert_eq!(matched[1].tx_hash, TxHash([5; 32]));
        assert!(matched.iter().all(|m| m.block_number == 9));
    }

    #[test]
    fn insert_retires_previous_address() {
        let book = AddressBook::new();
        let alice = NameRecord::dummy("alice");
        let bob = NameRecord::dummy("bob");
        book.replace([&alice, &bob]);
        let before = book.snapshot();

        let next = Address([0x42; 20]);
        book.insert("alice", next);
        let after = book.snapshot();

        assert!(before.contains(&alice.receiving_address));
        assert!(!after.contains(&alice.receiving_address));
        assert_eq!(after.name_of(&next), Some("alice"));
        assert!(after.contains(&bob.receiving_address));
        assert_eq!(after.version, before.version + 1);
    }

    #[test]
    fn readers_keep_their_snapshot_across_publish() {
        let book = AddressBook::new();
        let held = book.snapshot();
        book.replace([&NameRecord::dummy("carol")]);
        assert!(held.is_empty());
        assert_eq!(book.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_refresh() {
        let book = AddressBook::new();
        let mut rx = book.subscribe();
        let directory = InMemoryDirectory::with_records([
            NameRecord::dummy("a"),
            NameRecord::dummy("b"),
        ]);
        assert_eq!(book.refresh(&directory).await.unwrap(), 2);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 2);
    }

    /// Directory whose `list` returns records read before a rotation that
    /// the watcher publishes while the read is in flight.
    struct RotatingDuringList {
        inner: InMemoryDirectory,
        book: AddressBook,
        rotated: (String, Address),
    }

    #[async_trait]
    impl NameDirectory for RotatingDuringList {
        async fn find(&self, address: &Address) -> Result<Option<NameRecord>> {
            self.inner.find(address).await
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<NameRecord>> {
            self.inner.find_by_name(name).await
        }

        async fn upsert(&self, record: &NameRecord) -> Result<()> {
            self.inner.upsert(record).await
        }

        async fn compare_and_swap(
            &self,
            expected_counter: u64,
            record: &NameRecord,
        ) -> Result<CasOutcome> {
            self.inner.compare_and_swap(expected_counter, record).await
        }

        async fn list(&self) -> Result<Vec<NameRecord>> {
            let stale = self.inner.list().await?;
            let (name, address) = &self.rotated;
            self.book.insert(name, *address);
            Ok(stale)
        }
    }

    #[tokio::test]
    async fn refresh_keeps_insert_made_during_list() {
        let alice = NameRecord::dummy("alice");
        let bob = NameRecord::dummy("bob");
        let book = AddressBook::new();
        book.replace([&alice, &bob]);
        let rotated = Address([0x42; 20]);
        let directory = RotatingDuringList {
            inner: InMemoryDirectory::with_records([alice.clone(), bob.clone()]),
            book: book.clone(),
            rotated: ("alice".into(), rotated),
        };

        assert_eq!(book.refresh(&directory).await.unwrap(), 2);
        let snapshot = book.snapshot();
        assert_eq!(snapshot.name_of(&rotated), Some("alice"));
        assert!(!snapshot.contains(&alice.receiving_address));
        assert!(snapshot.contains(&bob.receiving_address));
    }

    #[tokio::test]
    async fn refresh_drops_inserts_older_than_the_read() {
        let alice = NameRecord::dummy("alice");
        let book = AddressBook::new();
        book.insert("alice", Address([0x42; 20]));
        let directory = InMemoryDirectory::with_records([alice.clone()]);

        book.refresh(&directory).await.unwrap();
        let snapshot = book.snapshot();
        assert_eq!(snapshot.name_of(&alice.receiving_address), Some("alice"));
        assert!(!snapshot.contains(&Address([0x42; 20])));
    }
}
