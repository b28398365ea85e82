//! End-to-end settlement cycles across the directory, key derivation and
//! the rollup.
//!
//! Every scenario runs the real orchestrator against a shared in-memory
//! rollup ledger, so balances moved by the master relay and the user
//! deposit can be checked directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use stealthmax_directory::{
    CasOutcome, InMemoryDirectory, InMemoryRegistry, NameDirectory, RegistrationService,
    RegistryDirectory,
};
use stealthmax_keys::{KeyDeriver, MasterSecret};
use stealthmax_settlement::{Operation, SettlementOrchestrator, SimulatedRollup};
use stealthmax_types::*;

const ONE_ETH: u128 = 1_000_000_000_000_000_000;

/// Orchestrator wired to in-memory collaborators.
struct Harness {
    keys: KeyDeriver,
    directory: Arc<InMemoryDirectory>,
    rollup: SimulatedRollup,
    orchestrator: SettlementOrchestrator,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SettlementConfig::default())
    }

    fn with_config(config: SettlementConfig) -> Self {
        let keys = KeyDeriver::new(MasterSecret::new([0x5a; 32]));
        let directory = Arc::new(InMemoryDirectory::new());
        let rollup = SimulatedRollup::new();
        let orchestrator = SettlementOrchestrator::new(
            keys.clone(),
            directory.clone(),
            Arc::new(rollup.clone()),
            config,
        );
        Self {
            keys,
            directory,
            rollup,
            orchestrator,
        }
    }

    async fn register(&self, name: &str, intmax: &str) -> NameRecord {
        let address = self.keys.legacy(name).unwrap().address();
        let record = NameRecord::registered(name, address, RollupAddress::new(intmax));
        self.directory.upsert(&record).await.unwrap();
        record
    }

    fn master_account(&self) -> RollupAddress {
        SimulatedRollup::account_for(self.keys.master().unwrap().address())
    }

    fn user_account(&self, name: &str) -> RollupAddress {
        SimulatedRollup::account_for(self.keys.legacy(name).unwrap().address())
    }
}

fn eth(s: &str) -> NativeAmount {
    NativeAmount::from_ether_str(s).unwrap()
}

fn settled(outcome: SettlementOutcome) -> SettlementResult {
    match outcome {
        SettlementOutcome::Settled(result) => result,
        SettlementOutcome::Unassociated { recipient } => {
            panic!("expected a settlement cycle, {recipient} was unassociated")
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn payment_to_alice_runs_every_step_and_rotates_once() {
    let h = Harness::new();
    let record = h.register("alice", "T6alice").await;
    h.rollup.fund(&h.master_account(), 2 * ONE_ETH);

    let transfer = MatchedTransfer::dummy(record.receiving_address, eth("1.5"));
    let result = settled(h.orchestrator.settle(&transfer).await.unwrap());

    assert!(result.success, "error: {:?}", result.error);
    assert!(result.error.is_none());
    assert!(result.tx_hash.is_some());
    assert_eq!(result.name, "alice");
    assert_eq!(result.amount, eth("1.5"));
    assert_eq!(result.settlement_address, h.master_account());
    for step in SettlementStep::ALL {
        assert_eq!(
            result.step_status(step),
            Some(&StepStatus::Completed),
            "step {step}"
        );
    }
    let order: Vec<_> = result.steps.iter().map(|r| r.step).collect();
    assert_eq!(order, SettlementStep::ALL.to_vec());

    // Relay moved 1.5 to the user's own rollup account; the deposit brought
    // 1.5 back to master.
    assert_eq!(h.rollup.balance(&RollupAddress::new("T6alice")), 1_500_000_000_000_000_000);
    assert_eq!(h.rollup.balance(&h.master_account()), 2 * ONE_ETH);
    let deposits = h.rollup.deposits_to(&h.master_account());
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].amount, 1_500_000_000_000_000_000);

    let stored = h.directory.get("alice").unwrap();
    assert_eq!(stored.counter, 1);
    assert_eq!(stored.receiving_address, h.keys.rotation_address("alice", 0).unwrap());
    assert_ne!(stored.receiving_address, h.keys.rotation_address("alice", 1).unwrap());
    assert_eq!(stored.settlement_address, RollupAddress::new("T6alice"));

    let rotation = result.rotation.unwrap();
    assert_eq!(rotation.derived_from, 0);
    assert_eq!(rotation.counter, 1);
    assert_eq!(rotation.address, stored.receiving_address);
    assert_eq!(rotation.attempts, 1);
}

#[tokio::test]
async fn empty_master_skips_relay_and_continues() {
    let h = Harness::new();
    let record = h.register("bob", "T6bob").await;

    let transfer = MatchedTransfer::dummy(record.receiving_address, eth("0.1"));
    let result = settled(h.orchestrator.settle(&transfer).await.unwrap());

    assert!(result.success);
    assert!(matches!(
        result.step_status(SettlementStep::MasterRelay),
        Some(StepStatus::Skipped(_))
    ));
    assert_eq!(h.rollup.count(Operation::Broadcast), 0);
    assert_eq!(h.rollup.count(Operation::Fee), 0);
    for step in [
        SettlementStep::MasterLogout,
        SettlementStep::UserInit,
        SettlementStep::UserDeposit,
        SettlementStep::RotateAddress,
        SettlementStep::UserLogout,
    ] {
        assert_eq!(result.step_status(step), Some(&StepStatus::Completed));
    }
    assert_eq!(h.directory.get("bob").unwrap().counter, 1);
}

#[tokio::test]
async fn failed_deposit_still_rotates() {
    let h = Harness::new();
    let record = h.register("carol", "T6carol").await;
    h.rollup.fail(Operation::Deposit, None, "deposit contract paused");

    let transfer = MatchedTransfer::dummy(record.receiving_address, eth("1"));
    let result = settled(h.orchestrator.settle(&transfer).await.unwrap());

    assert!(!result.success);
    assert!(result.tx_hash.is_none());
    assert!(result.error.as_deref().unwrap().contains("deposit contract paused"));
    assert!(matches!(
        result.step_status(SettlementStep::UserDeposit),
        Some(StepStatus::Failed(_))
    ));
    assert_eq!(
        result.step_status(SettlementStep::RotateAddress),
        Some(&StepStatus::Completed)
    );
    assert_eq!(
        result.step_status(SettlementStep::UserLogout),
        Some(&StepStatus::Completed)
    );
    assert_eq!(h.directory.get("carol").unwrap().counter, 1);
    assert!(result.rotation.is_some());
}

#[tokio::test]
async fn unknown_recipient_touches_nothing() {
    let h = Harness::new();
    h.register("dave", "T6dave").await;
    let writes_before = h.directory.writes();

    let stranger = Address([0x99; 20]);
    let outcome = h
        .orchestrator
        .settle(&MatchedTransfer::dummy(stranger, eth("3")))
        .await
        .unwrap();

    assert_eq!(outcome, SettlementOutcome::Unassociated { recipient: stranger });
    assert!(h.rollup.calls().is_empty());
    assert_eq!(h.directory.writes(), writes_before);
}

#[tokio::test]
async fn master_login_failure_aborts_without_rotation() {
    let h = Harness::new();
    let record = h.register("erin", "T6erin").await;
    h.rollup
        .fail(Operation::Login, Some(&h.master_account()), "bad credentials");

    let transfer = MatchedTransfer::dummy(record.receiving_address, eth("1"));
    let result = settled(h.orchestrator.settle(&transfer).await.unwrap());

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("bad credentials"));
    assert!(result.settlement_address.is_empty());
    assert_eq!(result.steps.len(), 2);
    assert!(matches!(
        result.step_status(SettlementStep::MasterInit),
        Some(StepStatus::Failed(_))
    ));
    assert!(result.rotation.is_none());
    assert_eq!(h.rollup.count(Operation::Deposit), 0);
    assert_eq!(h.directory.get("erin").unwrap().counter, 0);
}

#[tokio::test]
async fn user_login_failure_aborts_after_relay() {
    let h = Harness::new();
    let record = h.register("frank", "T6frank").await;
    h.rollup.fund(&h.master_account(), ONE_ETH);
    h.rollup
        .fail(Operation::Login, Some(&h.user_account("frank")), "account locked");

    let transfer = MatchedTransfer::dummy(record.receiving_address, eth("0.5"));
    let result = settled(h.orchestrator.settle(&transfer).await.unwrap());

    assert!(!result.success);
    assert_eq!(
        result.step_status(SettlementStep::MasterRelay),
        Some(&StepStatus::Completed)
    );
    assert!(matches!(
        result.step_status(SettlementStep::UserInit),
        Some(StepStatus::Failed(_))
    ));
    assert!(result.step_status(SettlementStep::RotateAddress).is_none());
    assert_eq!(h.directory.get("frank").unwrap().counter, 0);
    assert_eq!(result.settlement_address, h.master_account());
}

#[tokio::test]
async fn relay_failure_is_best_effort() {
    let h = Harness::new();
    let record = h.register("gina", "T6gina").await;
    h.rollup.fund(&h.master_account(), ONE_ETH);
    h.rollup.fail(Operation::Broadcast, None, "mempool full");
    h.rollup.fail(Operation::Logout, None, "session already gone");

    let transfer = MatchedTransfer::dummy(record.receiving_address, eth("0.2"));
    let result = settled(h.orchestrator.settle(&transfer).await.unwrap());

    assert!(result.success);
    assert!(matches!(
        result.step_status(SettlementStep::MasterRelay),
        Some(StepStatus::Failed(_))
    ));
    assert!(matches!(
        result.step_status(SettlementStep::MasterLogout),
        Some(StepStatus::Failed(_))
    ));
    assert!(matches!(
        result.step_status(SettlementStep::UserLogout),
        Some(StepStatus::Failed(_))
    ));
    assert!(result.error.is_none());
    assert_eq!(h.directory.get("gina").unwrap().counter, 1);
}

#[tokio::test]
async fn missing_native_token_fails_relay_and_deposit() {
    let h = Harness::new();
    let record = h.register("hank", "T6hank").await;
    h.rollup.set_tokens(Vec::new());

    let transfer = MatchedTransfer::dummy(record.receiving_address, eth("1"));
    let result = settled(h.orchestrator.settle(&transfer).await.unwrap());

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("SM_ERR_402"));
    assert_eq!(h.directory.get("hank").unwrap().counter, 1);
}

#[tokio::test]
async fn sequential_payments_follow_the_rotation() {
    let h = Harness::new();
    let record = h.register("ivy", "T6ivy").await;

    let first = MatchedTransfer::dummy(record.receiving_address, eth("0.1"));
    let second = MatchedTransfer::dummy(record.receiving_address, eth("0.2"));

    settled(h.orchestrator.settle(&first).await.unwrap());
    // Same block, same (now retired) address.
    let outcome = h.orchestrator.settle(&second).await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Unassociated { .. }));

    let current = h.directory.get("ivy").unwrap();
    let third = MatchedTransfer::dummy(current.receiving_address, eth("0.3"));
    let result = settled(h.orchestrator.settle(&third).await.unwrap());
    assert!(result.success);

    let stored = h.directory.get("ivy").unwrap();
    assert_eq!(stored.counter, 2);
    assert_eq!(stored.receiving_address, h.keys.rotation_address("ivy", 1).unwrap());
}

// =============================================================================
// Rotation races
// =============================================================================

/// Directory where another writer rotates the name right before our first
/// compare-and-swap.
struct RacingDirectory {
    inner: InMemoryDirectory,
    keys: KeyDeriver,
    always: bool,
    raced: AtomicBool,
}

#[async_trait]
impl NameDirectory for RacingDirectory {
    async fn find(&self, address: &Address) -> Result<Option<NameRecord>> {
        self.inner.find(address).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<NameRecord>> {
        self.inner.find_by_name(name).await
    }

    async fn upsert(&self, record: &NameRecord) -> Result<()> {
        self.inner.upsert(record).await
    }

    async fn compare_and_swap(&self, expected: u64, record: &NameRecord) -> Result<CasOutcome> {
        if self.always || !self.raced.swap(true, Ordering::SeqCst) {
            let stored = self.inner.get(&record.name).unwrap();
            let next = self.keys.rotation_address(&stored.name, stored.counter)?;
            self.inner.upsert(&stored.rotated(next)).await?;
        }
        self.inner.compare_and_swap(expected, record).await
    }

    async fn list(&self) -> Result<Vec<NameRecord>> {
        self.inner.list().await
    }
}

fn racing(always: bool, attempts: u32) -> (KeyDeriver, Arc<RacingDirectory>, SettlementOrchestrator) {
    let keys = KeyDeriver::new(MasterSecret::new([0x5a; 32]));
    let record = NameRecord::registered(
        "jade",
        keys.legacy("jade").unwrap().address(),
        RollupAddress::new("T6jade"),
    );
    let directory = Arc::new(RacingDirectory {
        inner: InMemoryDirectory::with_records([record]),
        keys: keys.clone(),
        always,
        raced: AtomicBool::new(false),
    });
    let orchestrator = SettlementOrchestrator::new(
        keys.clone(),
        directory.clone(),
        Arc::new(SimulatedRollup::new()),
        SettlementConfig {
            rotation_max_attempts: attempts,
        },
    );
    (keys, directory, orchestrator)
}

#[tokio::test]
async fn rotation_conflict_retries_on_fresh_counter() {
    let (keys, directory, orchestrator) = racing(false, 3);
    let start = keys.legacy("jade").unwrap().address();

    let result = settled(
        orchestrator
            .settle(&MatchedTransfer::dummy(start, eth("1")))
            .await
            .unwrap(),
    );

    let rotation = result.rotation.unwrap();
    assert_eq!(rotation.attempts, 2);
    assert_eq!(rotation.derived_from, 1);
    assert_eq!(rotation.counter, 2);
    let stored = directory.inner.get("jade").unwrap();
    assert_eq!(stored.counter, 2);
    assert_eq!(stored.receiving_address, keys.rotation_address("jade", 1).unwrap());
}

#[tokio::test]
async fn rotation_gives_up_after_max_attempts() {
    let (keys, directory, orchestrator) = racing(true, 2);
    let start = keys.legacy("jade").unwrap().address();

    let result = settled(
        orchestrator
            .settle(&MatchedTransfer::dummy(start, eth("1")))
            .await
            .unwrap(),
    );

    assert!(result.success, "deposit is reported independently of rotation");
    assert!(result.rotation.is_none());
    assert!(matches!(
        result.step_status(SettlementStep::RotateAddress),
        Some(StepStatus::Failed(msg)) if msg.contains("SM_ERR_305")
    ));
    assert_eq!(
        result.step_status(SettlementStep::UserLogout),
        Some(&StepStatus::Completed)
    );
    // Only the competing writer advanced the counter.
    assert_eq!(directory.inner.get("jade").unwrap().counter, 2);
}

// =============================================================================
// Registry-backed flow
// =============================================================================

#[tokio::test]
async fn registered_name_settles_through_the_registry() {
    let keys = KeyDeriver::new(MasterSecret::new([0x5a; 32]));
    let registry = Arc::new(InMemoryRegistry::new());
    let directory = Arc::new(RegistryDirectory::new(registry.clone(), "stealthmax.eth"));
    let registration =
        RegistrationService::new(directory.clone(), keys.clone(), ServiceConfig::default());
    let rollup = SimulatedRollup::new();
    let orchestrator = SettlementOrchestrator::new(
        keys.clone(),
        directory.clone(),
        Arc::new(rollup.clone()),
        SettlementConfig::default(),
    );

    let registered = registration.register("alice", "0xINTalice").await.unwrap();
    assert_eq!(registered.record.counter, 0);
    assert_eq!(registered.derived_address, keys.legacy("alice").unwrap().address());

    let result = settled(
        orchestrator
            .settle(&MatchedTransfer::dummy(registered.derived_address, eth("1.5")))
            .await
            .unwrap(),
    );
    assert!(result.success);

    let entry = registry.entry("stealthmax.eth", "alice").unwrap();
    let description = Description::decode(entry.description().unwrap()).unwrap();
    assert_eq!(description.counter(), 1);
    assert_eq!(description.settlement_address().as_str(), "0xINTalice");
    assert_eq!(
        entry.address.parse::<Address>().unwrap(),
        keys.rotation_address("alice", 0).unwrap()
    );
    // Default text records survive the rotation write.
    assert!(entry.text_records.contains_key("url"));
}

// =============================================================================
// Manual deposits and account queries
// =============================================================================

#[tokio::test]
async fn manual_deposit_uses_registered_target() {
    let h = Harness::new();
    h.register("kate", "T6kate").await;
    h.rollup.fund(&h.master_account(), ONE_ETH);

    let result = h
        .orchestrator
        .settle_manual("kate", eth("0.4"), None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(h.rollup.balance(&RollupAddress::new("T6kate")), 400_000_000_000_000_000);
    assert!(result.step_status(SettlementStep::RotateAddress).is_none());
    assert_eq!(h.directory.get("kate").unwrap().counter, 0);

    let balances = h.orchestrator.master_account().await.unwrap();
    assert_eq!(balances.rollup_address, h.master_account());
    assert_eq!(balances.data[0].amount, ONE_ETH);

    let history = h.orchestrator.deposits("kate").await.unwrap();
    assert_eq!(history.rollup_address, h.user_account("kate"));
    assert_eq!(history.data.len(), 1);
}
