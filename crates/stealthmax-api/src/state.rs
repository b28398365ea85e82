//! Shared handler state.

use std::sync::Arc;
use std::time::Instant;

use stealthmax_directory::{NameRegistry, RegistrationService};
use stealthmax_settlement::SettlementOrchestrator;
use stealthmax_types::ServiceConfig;
use stealthmax_watcher::AddressBook;

/// Everything a handler can reach. Cheap to clone.
pub struct AppState<R> {
    pub registration: Arc<RegistrationService<R>>,
    pub orchestrator: Arc<SettlementOrchestrator>,
    /// Monitored set; new registrations are added without waiting for a refresh.
    pub book: AddressBook,
    pub config: Arc<ServiceConfig>,
    pub started_at: Instant,
}

impl<R: NameRegistry> AppState<R> {
    pub fn new(
        registration: Arc<RegistrationService<R>>,
        orchestrator: Arc<SettlementOrchestrator>,
        book: AddressBook,
        config: ServiceConfig,
    ) -> Self {
        Self {
            registration,
            orchestrator,
            book,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            registration: self.registration.clone(),
            orchestrator: self.orchestrator.clone(),
            book: self.book.clone(),
            config: self.config.clone(),
            started_at: self.started_at,
        }
    }
}
