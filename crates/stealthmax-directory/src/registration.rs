//! Registration and listing on top of the registry-backed directory.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use stealthmax_keys::KeyDeriver;
use stealthmax_types::{
    Address, Description, NameRecord, Result, RollupAddress, ServiceConfig, StealthError,
};

use crate::directory::{NameDirectory, RegistryDirectory};
use crate::registry::{NameRegistry, RegistryEntry};

/// A completed registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub domain: String,
    pub subname: String,
    pub intmax_address: RollupAddress,
    pub derived_address: Address,
    pub record: NameRecord,
}

/// `(name, address)` as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamePair {
    pub name: String,
    pub address: String,
}

/// A monitored address with its explorer link.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoredName {
    pub name: String,
    pub address: String,
    pub etherscan: String,
}

/// A monitored address with everything the registry knows about it.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoredDetail {
    pub name: String,
    pub subdomain: String,
    pub ethereum_address: String,
    /// `None` when the entry has no description (unmanaged).
    pub intmax_address: Option<String>,
    pub nonce: u64,
    /// The description is a bare address written before rotation existed.
    pub legacy: bool,
    pub text_records: BTreeMap<String, String>,
    pub etherscan: String,
}

/// Thin CRUD layer: registers names at their legacy-mode address and
/// reports what the registry holds.
pub struct RegistrationService<R> {
    directory: Arc<RegistryDirectory<R>>,
    keys: KeyDeriver,
    config: ServiceConfig,
}

impl<R: NameRegistry> RegistrationService<R> {
    pub fn new(directory: Arc<RegistryDirectory<R>>, keys: KeyDeriver, config: ServiceConfig) -> Self {
        Self {
            directory,
            keys,
            config,
        }
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        self.directory.domain()
    }

    /// Register `subname`, pointing it at `derive(secret, subname, None)` and
    /// storing `{ intmax_address, nonce: 0 }` as its description.
    ///
    /// # Errors
    /// - `InvalidRequest` if either field is empty
    /// - `NameTaken` if the registry already has an entry for `subname`
    /// - registry errors (`Authentication`, `Network`, ...) as returned
    pub async fn register(&self, subname: &str, intmax_address: &str) -> Result<Registration> {
        let subname = subname.trim();
        let intmax_address = intmax_address.trim();
        if subname.is_empty() || intmax_address.is_empty() {
            return Err(StealthError::InvalidRequest(
                "Missing required fields: subname and intmax_address are required".into(),
            ));
        }
        if let Some(existing) = self.directory.entry(subname).await? {
            tracing::info!(name = %existing.name, address = %existing.address, "Subdomain already registered");
            return Err(StealthError::NameTaken(subname.to_string()));
        }

        let derived_address = self.keys.legacy(subname)?.address();
        let record = NameRecord::registered(
            subname,
            derived_address,
            RollupAddress::new(intmax_address),
        );
        self.directory.upsert(&record).await?;
        tracing::info!(
            name = %subname,
            address = %derived_address,
            intmax_address,
            "Name registered"
        );

        Ok(Registration {
            domain: self.domain().to_string(),
            subname: subname.to_string(),
            intmax_address: record.settlement_address.clone(),
            derived_address,
            record,
        })
    }

    /// Legacy-mode address for `parameter`.
    ///
    /// # Errors
    /// `InvalidRequest` if `parameter` is empty.
    pub fn derive_address(&self, parameter: &str) -> Result<Address> {
        if parameter.is_empty() {
            return Err(StealthError::InvalidRequest("Parameter is required".into()));
        }
        Ok(self.keys.legacy(parameter)?.address())
    }

    /// Every `(name, address)` under the domain.
    pub async fn list_names(&self) -> Result<Vec<NamePair>> {
        Ok(self
            .directory
            .entries()
            .await?
            .into_iter()
            .map(|e| NamePair {
                name: e.name,
                address: e.address,
            })
            .collect())
    }

    pub async fn monitoring_status(&self) -> Result<Vec<MonitoredName>> {
        Ok(self
            .directory
            .entries()
            .await?
            .into_iter()
            .map(|e| MonitoredName {
                etherscan: self.config.explorer_address_url(&e.address),
                name: e.name,
                address: e.address,
            })
            .collect())
    }

    pub async fn monitoring_details(&self) -> Result<Vec<MonitoredDetail>> {
        Ok(self
            .directory
            .entries()
            .await?
            .into_iter()
            .map(|e| self.detail(e))
            .collect())
    }

    /// The managed record for `name`, if any.
    pub async fn lookup(&self, name: &str) -> Result<Option<NameRecord>> {
        self.directory.find_by_name(name).await
    }

    fn detail(&self, entry: RegistryEntry) -> MonitoredDetail {
        let description = entry.description().and_then(Description::decode);
        MonitoredDetail {
            subdomain: format!("{}.{}", entry.name, self.domain()),
            etherscan: self.config.explorer_address_url(&entry.address),
            intmax_address: description
                .as_ref()
                .map(|d| d.settlement_address().to_string()),
            nonce: description.as_ref().map_or(0, Description::counter),
            legacy: description.as_ref().is_some_and(Description::is_legacy),
            name: entry.name,
            ethereum_address: entry.address,
            text_records: entry.text_records,
        }
    }
}
