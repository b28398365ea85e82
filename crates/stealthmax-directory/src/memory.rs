//! Self-contained in-memory [`NameDirectory`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use stealthmax_types::{Address, NameRecord, Result, StealthError};

use crate::directory::{CasOutcome, NameDirectory};

/// Records keyed by name, with a true compare-and-swap.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    records: RwLock<BTreeMap<String, NameRecord>>,
    writes: AtomicUsize,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory pre-populated with `records`. Seeding does not
    /// count as a write.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = NameRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.name.clone(), r)).collect();
        Self {
            records: RwLock::new(map),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful writes (upserts and swaps) so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current record for `name`, synchronously.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<NameRecord> {
        self.records.read().get(name).cloned()
    }
}

#[async_trait]
impl NameDirectory for InMemoryDirectory {
    async fn find(&self, address: &Address) -> Result<Option<NameRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.receiving_address == *address)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<NameRecord>> {
        Ok(self.get(name))
    }

    async fn upsert(&self, record: &NameRecord) -> Result<()> {
        self.records
            .write()
            .insert(record.name.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected_counter: u64,
        record: &NameRecord,
    ) -> Result<CasOutcome> {
        let mut records = self.records.write();
        let current = records
            .get(&record.name)
            .ok_or_else(|| StealthError::RecordNotFound(record.name.clone()))?;
        if current.counter != expected_counter {
            return Ok(CasOutcome::Conflict {
                current: current.clone(),
            });
        }
        records.insert(record.name.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(CasOutcome::Swapped)
    }

    async fn list(&self) -> Result<Vec<NameRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }
}
