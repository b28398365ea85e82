//! The external name-registry port.
//!
//! The registry is a key/value store of subname entries: each entry has a
//! resolved address and a bag of text records. Only the `description`
//! record carries meaning for settlement; the rest are preserved verbatim.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stealthmax_types::{Result, StealthError, constants};

/// One subname entry as the registry stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(default)]
    pub domain: String,
    /// Resolved address. Kept as text: the registry does not validate it.
    pub address: String,
    #[serde(default)]
    pub text_records: BTreeMap<String, String>,
}

impl RegistryEntry {
    /// The raw `description` text record, if set.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.text_records
            .get(constants::DESCRIPTION_RECORD_KEY)
            .map(String::as_str)
    }
}

/// Outbound port to the name registry.
#[async_trait]
pub trait NameRegistry: Send + Sync {
    /// Every entry under `domain`.
    async fn get_names(&self, domain: &str) -> Result<Vec<RegistryEntry>>;

    /// Entries under `domain` matching `name` (exactly, or as a prefix).
    async fn search_names(&self, domain: &str, name: &str, exact: bool)
    -> Result<Vec<RegistryEntry>>;

    /// Create or replace an entry.
    async fn set_name(&self, entry: &RegistryEntry) -> Result<()>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// Failure an [`InMemoryRegistry`] can be told to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Authentication,
    Network,
    Malformed,
}

impl InjectedFailure {
    fn to_error(self) -> StealthError {
        match self {
            Self::Authentication => StealthError::Authentication("invalid API key".into()),
            Self::Network => StealthError::Network("registry unreachable".into()),
            Self::Malformed => StealthError::Registry("unexpected payload".into()),
        }
    }
}

/// Registry kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: Mutex<BTreeMap<(String, String), RegistryEntry>>,
    failure: Mutex<Option<InjectedFailure>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry directly, bypassing failure injection.
    pub fn seed(&self, entry: RegistryEntry) {
        self.entries
            .lock()
            .insert((entry.domain.clone(), entry.name.clone()), entry);
    }

    /// Make every subsequent call fail with `failure` (or succeed again
    /// with `None`).
    pub fn fail_with(&self, failure: Option<InjectedFailure>) {
        *self.failure.lock() = failure;
    }

    /// Number of calls made to `method` (`get_names`, `search_names`, `set_name`).
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    /// Snapshot of a stored entry.
    #[must_use]
    pub fn entry(&self, domain: &str, name: &str) -> Option<RegistryEntry> {
        self.entries
            .lock()
            .get(&(domain.to_string(), name.to_string()))
            .cloned()
    }

    fn enter(&self, method: &'static str) -> Result<()> {
        *self.calls.lock().entry(method).or_insert(0) += 1;
        match *self.failure.lock() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NameRegistry for InMemoryRegistry {
    async fn get_names(&self, domain: &str) -> Result<Vec<RegistryEntry>> {
        self.enter("get_names")?;
        Ok(self
            .entries
            .lock()
            .values()
            .filter(|e| e.domain == domain)
            .cloned()
            .collect())
    }

    async fn search_names(
        &self,
        domain: &str,
        name: &str,
        exact: bool,
    ) -> Result<Vec<RegistryEntry>> {
        self.enter("search_names")?;
        Ok(self
            .entries
            .lock()
            .values()
            .filter(|e| e.domain == domain)
            .filter(|e| {
                if exact {
                    e.name == name
                } else {
                    e.name.starts_with(name)
                }
            })
            .cloned()
            .collect())
    }

    async fn set_name(&self, entry: &RegistryEntry) -> Result<()> {
        self.enter("set_name")?;
        self.entries
            .lock()
            .insert((entry.domain.clone(), entry.name.clone()), entry.clone());
        Ok(())
    }
}
