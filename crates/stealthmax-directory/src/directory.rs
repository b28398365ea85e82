//! The record-level directory contract and its registry-backed implementation.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use stealthmax_types::{Address, Description, NameRecord, Result, StealthError, constants};

use crate::registry::{NameRegistry, RegistryEntry};

/// Result of a conditional rotation write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored counter matched and the new record was written.
    Swapped,
    /// Another writer got there first; `current` is what is stored now.
    Conflict { current: NameRecord },
}

/// Name → record store consumed by the settlement core.
///
/// Writes must be visible to every read that starts after they return.
#[async_trait]
pub trait NameDirectory: Send + Sync {
    /// The managed record whose current receiving address is `address`.
    async fn find(&self, address: &Address) -> Result<Option<NameRecord>>;

    /// The managed record for `name`.
    async fn find_by_name(&self, name: &str) -> Result<Option<NameRecord>>;

    /// Unconditionally store `record`.
    async fn upsert(&self, record: &NameRecord) -> Result<()>;

    /// Store `record` only if the stored counter for `record.name` still
    /// equals `expected_counter`.
    ///
    /// # Errors
    /// `RecordNotFound` if the name has no managed record.
    async fn compare_and_swap(&self, expected_counter: u64, record: &NameRecord)
    -> Result<CasOutcome>;

    /// Every managed record.
    async fn list(&self) -> Result<Vec<NameRecord>>;
}

// =============================================================================
// Registry-backed directory
// =============================================================================

/// [`NameDirectory`] over an external [`NameRegistry`].
///
/// The registry has no conditional write, so compare-and-swap is serialized
/// per name inside this process: re-read, compare, write, all under one
/// async lock.
pub struct RegistryDirectory<R> {
    registry: Arc<R>,
    domain: String,
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<R: NameRegistry> RegistryDirectory<R> {
    pub fn new(registry: Arc<R>, domain: impl Into<String>) -> Self {
        Self {
            registry,
            domain: domain.into(),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Every raw entry under the domain, managed or not.
    pub async fn entries(&self) -> Result<Vec<RegistryEntry>> {
        self.registry.get_names(&self.domain).await
    }

    /// The raw entry for `name`, managed or not.
    pub async fn entry(&self, name: &str) -> Result<Option<RegistryEntry>> {
        let found = self.registry.search_names(&self.domain, name, true).await?;
        Ok(found.into_iter().find(|e| e.name == name))
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.name_locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn write(&self, record: &NameRecord) -> Result<()> {
        let mut text_records = match self.entry(&record.name).await? {
            Some(existing) => existing.text_records,
            None => constants::DEFAULT_TEXT_RECORDS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        };
        text_records.insert(
            constants::DESCRIPTION_RECORD_KEY.to_string(),
            record.description().encode(),
        );
        let entry = RegistryEntry {
            name: record.name.clone(),
            domain: self.domain.clone(),
            address: record.receiving_address.to_checksum(),
            text_records,
        };
        self.registry.set_name(&entry).await
    }
}

/// Decode a registry entry into a managed record.
///
/// Entries without a description are unmanaged. Entries whose address does
/// not parse are skipped with a warning.
#[must_use]
pub fn record_from_entry(entry: &RegistryEntry) -> Option<NameRecord> {
    let description = Description::decode(entry.description()?)?;
    let receiving_address = match entry.address.parse::<Address>() {
        Ok(address) => address,
        Err(err) => {
            tracing::warn!(name = %entry.name, address = %entry.address, error = %err, "Skipping entry with unparsable address");
            return None;
        }
    };
    if description.is_legacy() {
        tracing::debug!(name = %entry.name, "Legacy description, treating nonce as 0");
    }
    Some(NameRecord {
        name: entry.name.clone(),
        receiving_address,
        counter: description.counter(),
        settlement_address: description.settlement_address().clone(),
    })
}

#[async_trait]
impl<R: NameRegistry> NameDirectory for RegistryDirectory<R> {
    async fn find(&self, address: &Address) -> Result<Option<NameRecord>> {
        let entries = self.entries().await?;
        Ok(entries
            .iter()
            .filter(|e| {
                e.address
                    .parse::<Address>()
                    .is_ok_and(|parsed| parsed == *address)
            })
            .find_map(record_from_entry))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<NameRecord>> {
        Ok(self.entry(name).await?.as_ref().and_then(record_from_entry))
    }

    async fn upsert(&self, record: &NameRecord) -> Result<()> {
        let lock = self.lock_for(&record.name);
        let _guard = lock.lock().await;
        self.write(record).await
    }

    async fn compare_and_swap(
        &self,
        expected_counter: u64,
        record: &NameRecord,
    ) -> Result<CasOutcome> {
        let lock = self.lock_for(&record.name);
        let _guard = lock.lock().await;
        let current = self
            .find_by_name(&record.name)
            .await?
            .ok_or_else(|| StealthError::RecordNotFound(record.name.clone()))?;
        if current.counter != expected_counter {
            return Ok(CasOutcome::Conflict { current });
        }
        self.write(record).await?;
        Ok(CasOutcome::Swapped)
    }

    async fn list(&self) -> Result<Vec<NameRecord>> {
        let entries = self.entries().await?;
        Ok(entries.iter().filter_map(record_from_entry).collect())
    }
}
