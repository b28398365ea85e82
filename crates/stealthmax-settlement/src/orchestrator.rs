//! The settlement state machine.
//!
//! One cycle per matched transfer:
//!
//! 1. `ResolveTarget`: look the recipient up in the directory
//! 2. `MasterInit`: open the master rollup session
//! 3. `MasterRelay`: pre-fund the user's rollup account if master can afford it
//! 4. `MasterLogout`
//! 5. `UserInit`: open the per-name session (legacy-mode key)
//! 6. `UserDeposit`: deposit the received amount from the user identity to master
//! 7. `RotateAddress`: advance the name to its next one-time address
//! 8. `UserLogout`
//!
//! Steps run through a single runner that records every outcome and
//! consults [`SettlementStep::policy`]: a failing `Required` step ends the
//! cycle, a failing `BestEffort` step is logged and the cycle moves on.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use stealthmax_directory::{CasOutcome, NameDirectory};
use stealthmax_keys::{DerivedKeypair, KeyDeriver};
use stealthmax_types::{
    CycleId, MatchedTransfer, NameRecord, NativeAmount, Result, RollupAddress, RotationOutcome,
    SettlementConfig, SettlementOutcome, SettlementResult, SettlementStep, StealthError,
    StepPolicy, StepRecord, StepStatus,
};

use crate::rollup::{
    DepositParams, DepositReceipt, DepositRecord, DepositStatus, RollupClient, RollupConnector,
    RollupToken, TokenBalance, TransferRecord, TransferRequest, TransferStatus, balance_of,
    native_token,
};

/// Future returned by a [`RollupClient`] call borrowed for `'c`.
pub type ClientFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Read-only view of one rollup account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView<T> {
    /// Name the identity was derived from (`None` for master).
    pub name: Option<String>,
    pub rollup_address: RollupAddress,
    pub data: T,
}

// ---------------------------------------------------------------------------
// Step runner
// ---------------------------------------------------------------------------

/// What a step produced, and whether it deliberately did nothing.
struct StepOutput<T> {
    value: T,
    skipped: Option<String>,
}

impl<T> StepOutput<T> {
    fn done(value: T) -> Self {
        Self {
            value,
            skipped: None,
        }
    }

    fn skipped(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            skipped: Some(reason.into()),
        }
    }
}

/// An open rollup session.
struct Session {
    client: Box<dyn RollupClient>,
    address: RollupAddress,
}

/// What a cycle should do once the target is known.
struct CyclePlan {
    name: String,
    /// User's rollup account: recipient of the master relay.
    relay_to: RollupAddress,
    /// The record to rotate after the deposit. `None` for manual deposits.
    rotate: Option<NameRecord>,
}

/// In-flight state of one cycle. Never persisted.
struct SettlementAttempt {
    cycle_id: CycleId,
    name: String,
    amount: NativeAmount,
    steps: Vec<StepRecord>,
    master_address: Option<RollupAddress>,
    native_token: Option<RollupToken>,
    deposit: Option<DepositReceipt>,
    rotation: Option<RotationOutcome>,
    abort: Option<String>,
}

impl SettlementAttempt {
    fn new(name: &str, amount: NativeAmount) -> Self {
        Self {
            cycle_id: CycleId::new(),
            name: name.to_string(),
            amount,
            steps: Vec::with_capacity(SettlementStep::ALL.len()),
            master_address: None,
            native_token: None,
            deposit: None,
            rotation: None,
            abort: None,
        }
    }

    fn record(&mut self, step: SettlementStep, status: StepStatus) {
        self.steps.push(StepRecord { step, status });
    }

    /// Run one step under its policy.
    ///
    /// Returns `Err` only when a `Required` step fails; a failing
    /// `BestEffort` step yields `Ok(None)`.
    async fn run<T>(
        &mut self,
        step: SettlementStep,
        fut: impl Future<Output = Result<StepOutput<T>>>,
    ) -> Result<Option<T>> {
        tracing::debug!(cycle_id = %self.cycle_id, name = %self.name, %step, ordinal = step.ordinal(), "Step started");
        match fut.await {
            Ok(StepOutput {
                value,
                skipped: None,
            }) => {
                self.record(step, StepStatus::Completed);
                Ok(Some(value))
            }
            Ok(StepOutput {
                value,
                skipped: Some(reason),
            }) => {
                tracing::info!(cycle_id = %self.cycle_id, name = %self.name, %step, %reason, "Step skipped");
                self.record(step, StepStatus::Skipped(reason));
                Ok(Some(value))
            }
            Err(err) => {
                self.record(step, StepStatus::Failed(err.to_string()));
                match step.policy() {
                    StepPolicy::Required => {
                        tracing::error!(cycle_id = %self.cycle_id, name = %self.name, %step, error = %err, "Required step failed, aborting cycle");
                        self.abort = Some(err.to_string());
                        Err(err)
                    }
                    StepPolicy::BestEffort => {
                        tracing::warn!(cycle_id = %self.cycle_id, name = %self.name, %step, error = %err, "Step failed, continuing");
                        Ok(None)
                    }
                }
            }
        }
    }

    fn finish(self) -> SettlementResult {
        let deposit_error = self.steps.iter().find_map(|r| match (&r.step, &r.status) {
            (SettlementStep::UserDeposit, StepStatus::Failed(msg)) => Some(msg.clone()),
            _ => None,
        });
        let result = SettlementResult {
            cycle_id: self.cycle_id,
            name: self.name,
            success: self.deposit.is_some(),
            tx_hash: self.deposit.map(|d| d.tx_hash),
            settlement_address: self
                .master_address
                .unwrap_or_else(|| RollupAddress::new(String::new())),
            amount: self.amount,
            error: self.abort.or(deposit_error),
            rotation: self.rotation,
            steps: self.steps,
        };
        if result.success {
            tracing::info!(
                cycle_id = %result.cycle_id,
                name = %result.name,
                amount = %result.amount.format_ether(),
                tx_hash = ?result.tx_hash,
                rotated_to = ?result.rotation.as_ref().map(|r| r.address),
                "Settlement cycle completed"
            );
        } else {
            tracing::warn!(
                cycle_id = %result.cycle_id,
                name = %result.name,
                error = ?result.error,
                rotated_to = ?result.rotation.as_ref().map(|r| r.address),
                "Settlement cycle finished without a deposit"
            );
        }
        result
    }
}

fn missing_value(step: SettlementStep) -> StealthError {
    StealthError::Internal(format!("{step} produced no value"))
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives settlement cycles against a directory and a rollup.
///
/// Cycles for different transfers are independent. Callers are expected
/// to run at most one cycle per name at a time; rotation detects
/// violations through compare-and-swap and retries on the fresh counter.
pub struct SettlementOrchestrator {
    keys: KeyDeriver,
    directory: Arc<dyn NameDirectory>,
    rollup: Arc<dyn RollupConnector>,
    config: SettlementConfig,
}

impl SettlementOrchestrator {
    pub fn new(
        keys: KeyDeriver,
        directory: Arc<dyn NameDirectory>,
        rollup: Arc<dyn RollupConnector>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            keys,
            directory,
            rollup,
            config,
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn NameDirectory> {
        &self.directory
    }

    /// Settle one observed transfer.
    ///
    /// An unknown recipient ends the cycle at step 1 with
    /// [`SettlementOutcome::Unassociated`] and touches nothing else.
    ///
    /// # Errors
    /// Only a directory failure during `ResolveTarget`; the cycle never
    /// started, so the caller may retry the transfer. Every later failure
    /// is reported inside the returned [`SettlementResult`].
    pub async fn settle(&self, transfer: &MatchedTransfer) -> Result<SettlementOutcome> {
        self.settle_monitored(transfer, None).await
    }

    /// [`settle`](Self::settle) for a recipient that was monitored as
    /// `monitored_as` when its block was matched.
    ///
    /// If the recipient is no longer any name's current address (a transfer
    /// earlier in the same block already rotated it), the cycle settles
    /// under `monitored_as` and rotates from that name's current record.
    ///
    /// # Errors
    /// As for [`settle`](Self::settle).
    pub async fn settle_monitored(
        &self,
        transfer: &MatchedTransfer,
        monitored_as: Option<&str>,
    ) -> Result<SettlementOutcome> {
        let record = match self.resolve(transfer, monitored_as).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::info!(
                    recipient = %transfer.recipient,
                    tx_hash = %transfer.tx_hash,
                    "Transfer to an address with no managed name"
                );
                return Ok(SettlementOutcome::Unassociated {
                    recipient: transfer.recipient,
                });
            }
            Err(err) => {
                tracing::error!(
                    recipient = %transfer.recipient,
                    tx_hash = %transfer.tx_hash,
                    error = %err,
                    "Could not resolve transfer recipient"
                );
                return Err(err);
            }
        };

        let mut attempt = SettlementAttempt::new(&record.name, transfer.amount);
        attempt.record(SettlementStep::ResolveTarget, StepStatus::Completed);
        tracing::info!(
            cycle_id = %attempt.cycle_id,
            name = %record.name,
            recipient = %transfer.recipient,
            sender = %transfer.sender,
            amount = %transfer.amount.format_ether(),
            tx_hash = %transfer.tx_hash,
            block = transfer.block_number,
            counter = record.counter,
            "ETH received, starting settlement"
        );

        let plan = CyclePlan {
            name: record.name.clone(),
            relay_to: record.settlement_address.clone(),
            rotate: Some(record),
        };
        // Failures are already recorded in the attempt.
        let _ = self.drive(&mut attempt, &plan).await;
        Ok(SettlementOutcome::Settled(attempt.finish()))
    }

    async fn resolve(
        &self,
        transfer: &MatchedTransfer,
        monitored_as: Option<&str>,
    ) -> Result<Option<NameRecord>> {
        if let Some(record) = self.directory.find(&transfer.recipient).await? {
            return Ok(Some(record));
        }
        let Some(name) = monitored_as else {
            return Ok(None);
        };
        let record = self.directory.find_by_name(name).await?;
        if let Some(current) = &record {
            tracing::info!(
                name,
                recipient = %transfer.recipient,
                current = %current.receiving_address,
                counter = current.counter,
                "Recipient already rotated away, settling under its monitored name"
            );
        }
        Ok(record)
    }

    /// Operator-initiated deposit for `name`: steps 2 to 6 and 8, no rotation.
    ///
    /// `target` is the user's rollup account; when absent it is taken from
    /// the name's directory record.
    ///
    /// # Errors
    /// `InvalidRequest` for an empty name, a zero amount, or when no target
    /// can be found. Directory errors while looking up the target.
    pub async fn settle_manual(
        &self,
        name: &str,
        amount: NativeAmount,
        target: Option<RollupAddress>,
    ) -> Result<SettlementResult> {
        if name.trim().is_empty() || amount.is_zero() {
            return Err(StealthError::InvalidRequest(
                "Parameter and amount are required".into(),
            ));
        }
        let (relay_to, resolved) = match target.filter(|t| !t.is_empty()) {
            Some(target) => (
                target,
                StepStatus::Skipped("target given by caller".into()),
            ),
            None => {
                let found = self
                    .directory
                    .find_by_name(name)
                    .await?
                    .map(|r| r.settlement_address)
                    .ok_or_else(|| {
                        StealthError::InvalidRequest(
                            "INTMAX address not found. Please provide intmax_address or register the name first."
                                .into(),
                        )
                    })?;
                (found, StepStatus::Completed)
            }
        };

        let mut attempt = SettlementAttempt::new(name, amount);
        attempt.record(SettlementStep::ResolveTarget, resolved);
        tracing::info!(cycle_id = %attempt.cycle_id, name, amount = %amount.format_ether(), target = %relay_to, "Manual deposit requested");

        let plan = CyclePlan {
            name: name.to_string(),
            relay_to,
            rotate: None,
        };
        let _ = self.drive(&mut attempt, &plan).await;
        Ok(attempt.finish())
    }

    /// Steps 2 to 8.
    async fn drive(&self, attempt: &mut SettlementAttempt, plan: &CyclePlan) -> Result<()> {
        let amount = attempt.amount;

        let master = attempt
            .run(SettlementStep::MasterInit, self.open_master())
            .await?
            .ok_or_else(|| missing_value(SettlementStep::MasterInit))?;
        attempt.master_address = Some(master.address.clone());

        attempt.native_token = attempt
            .run(
                SettlementStep::MasterRelay,
                self.relay(&master, &plan.relay_to, amount),
            )
            .await?;

        attempt
            .run(SettlementStep::MasterLogout, close(&master))
            .await?;

        let user = attempt
            .run(SettlementStep::UserInit, self.open_user(&plan.name))
            .await?
            .ok_or_else(|| missing_value(SettlementStep::UserInit))?;

        let token = attempt.native_token.clone();
        attempt.deposit = attempt
            .run(
                SettlementStep::UserDeposit,
                deposit(&user, token, &master.address, amount),
            )
            .await?;

        if let Some(record) = &plan.rotate {
            attempt.rotation = attempt
                .run(SettlementStep::RotateAddress, self.rotate(record))
                .await?;
        }

        attempt.run(SettlementStep::UserLogout, close(&user)).await?;
        Ok(())
    }

    async fn open(&self, keypair: &DerivedKeypair) -> Result<Session> {
        let client = self.rollup.connect(keypair).await?;
        let address = client.login().await?;
        Ok(Session { client, address })
    }

    async fn open_master(&self) -> Result<StepOutput<Session>> {
        let session = self.open(&self.keys.master()?).await?;
        tracing::info!(rollup_address = %session.address, "Master rollup session open");
        Ok(StepOutput::done(session))
    }

    async fn open_user(&self, name: &str) -> Result<StepOutput<Session>> {
        let keypair = self.keys.legacy(name)?;
        let session = self.open(&keypair).await?;
        tracing::info!(name, account = %keypair.address(), rollup_address = %session.address, "Per-name rollup session open");
        Ok(StepOutput::done(session))
    }

    /// Step 3. Returns the native token descriptor so step 6 can reuse it.
    async fn relay(
        &self,
        master: &Session,
        to: &RollupAddress,
        amount: NativeAmount,
    ) -> Result<StepOutput<RollupToken>> {
        let token = native_token(&master.client.tokens().await?)?;
        let balance = balance_of(&master.client.token_balances().await?, &token);
        let needed = amount.to_units(token.decimals())?;
        tracing::info!(master = %master.address, balance, needed, "Master rollup balance");
        if balance < needed {
            return Ok(StepOutput::skipped(
                token,
                format!("master balance {balance} below transfer amount {needed}"),
            ));
        }

        if let Some(fee) = master.client.transfer_fee().await? {
            tracing::debug!(token_index = fee.token_index, fee = fee.amount, "Transfer fee");
        }
        let receipt = master
            .client
            .broadcast_transaction(&[TransferRequest {
                amount,
                token: token.clone(),
                address: to.clone(),
            }])
            .await?;
        tracing::info!(to = %to, tx_hash = ?receipt.tx_hash, "Master relay broadcast");

        match master.client.transfers().await {
            Ok(transfers) => tracing::debug!(
                pending = count_pending_transfers(&transfers),
                total = transfers.len(),
                "Master transfer history"
            ),
            Err(err) => tracing::warn!(error = %err, "Could not read master transfer history"),
        }
        Ok(StepOutput::done(token))
    }

    /// Step 7: compare-and-swap the counter, retrying on the fresh record.
    async fn rotate(&self, record: &NameRecord) -> Result<StepOutput<RotationOutcome>> {
        let mut current = record.clone();
        for attempt in 1..=self.config.rotation_max_attempts {
            let address = self.keys.rotation_address(&current.name, current.counter)?;
            let next = current.rotated(address);
            match self.directory.compare_and_swap(current.counter, &next).await? {
                CasOutcome::Swapped => {
                    tracing::info!(
                        name = %next.name,
                        from = %current.receiving_address,
                        to = %address,
                        counter = next.counter,
                        attempt,
                        "Receiving address rotated"
                    );
                    return Ok(StepOutput::done(RotationOutcome {
                        derived_from: current.counter,
                        counter: next.counter,
                        address,
                        attempts: attempt,
                    }));
                }
                CasOutcome::Conflict { current: fresh } => {
                    tracing::warn!(
                        name = %fresh.name,
                        expected = current.counter,
                        found = fresh.counter,
                        attempt,
                        "Concurrent rotation detected, retrying on fresh counter"
                    );
                    current = fresh;
                }
            }
        }
        let stored = self
            .directory
            .find_by_name(&record.name)
            .await?
            .map_or(current.counter, |r| r.counter);
        Err(StealthError::RotationConflict {
            name: record.name.clone(),
            expected: current.counter,
            actual: stored,
        })
    }

    // -----------------------------------------------------------------------
    // Account queries
    // -----------------------------------------------------------------------

    /// Log in as `keypair`, run `query`, and always log out.
    async fn with_session<T, F>(
        &self,
        name: Option<&str>,
        keypair: &DerivedKeypair,
        query: F,
    ) -> Result<AccountView<T>>
    where
        F: for<'c> FnOnce(&'c dyn RollupClient) -> ClientFuture<'c, T>,
    {
        let session = self.open(keypair).await?;
        let data = query(&*session.client).await;
        if let Err(err) = session.client.logout().await {
            tracing::warn!(name = ?name, error = %err, "Rollup logout failed");
        }
        Ok(AccountView {
            name: name.map(str::to_string),
            rollup_address: session.address,
            data: data?,
        })
    }

    /// Rollup balances of the per-name identity.
    pub async fn balances(&self, name: &str) -> Result<AccountView<Vec<TokenBalance>>> {
        let keypair = self.keys.legacy(name)?;
        self.with_session(Some(name), &keypair, |c| c.token_balances())
            .await
    }

    /// Rollup deposit history of the per-name identity.
    pub async fn deposits(&self, name: &str) -> Result<AccountView<Vec<DepositRecord>>> {
        let keypair = self.keys.legacy(name)?;
        self.with_session(Some(name), &keypair, |c| c.deposits())
            .await
    }

    /// Rollup transfer history of the per-name identity.
    pub async fn transfers(&self, name: &str) -> Result<AccountView<Vec<TransferRecord>>> {
        let keypair = self.keys.legacy(name)?;
        self.with_session(Some(name), &keypair, |c| c.transfers())
            .await
    }

    /// The master identity's rollup address and balances.
    pub async fn master_account(&self) -> Result<AccountView<Vec<TokenBalance>>> {
        let keypair = self.keys.master()?;
        self.with_session(None, &keypair, |c| c.token_balances())
            .await
    }
}

/// Step 6.
async fn deposit(
    user: &Session,
    token: Option<RollupToken>,
    master: &RollupAddress,
    amount: NativeAmount,
) -> Result<StepOutput<DepositReceipt>> {
    let token = match token {
        Some(token) => token,
        None => native_token(&user.client.tokens().await?)?,
    };
    let units = amount.to_units(token.decimals())?;
    let params = DepositParams {
        amount: units,
        token,
        address: master.clone(),
        is_mining: false,
    };
    tracing::info!(from = %user.address, to = %master, units, "Depositing to master");
    let receipt = user.client.deposit(&params).await?;
    tracing::info!(tx_hash = %receipt.tx_hash, "Deposit to master submitted");

    match user.client.deposits().await {
        Ok(deposits) => tracing::debug!(
            pending = deposits
                .iter()
                .filter(|d| d.status == DepositStatus::Processing)
                .count(),
            total = deposits.len(),
            "Per-name deposit history"
        ),
        Err(err) => tracing::warn!(error = %err, "Could not read deposit history"),
    }
    Ok(StepOutput::done(receipt))
}

/// Steps 4 and 8.
async fn close(session: &Session) -> Result<StepOutput<()>> {
    session.client.logout().await.map(StepOutput::done)
}

fn count_pending_transfers(transfers: &[TransferRecord]) -> usize {
    transfers
        .iter()
        .filter(|t| t.status == TransferStatus::Pending)
        .count()
}

#[cfg(test)]
mod tests {
    use stealthmax_directory::InMemoryDirectory;
    use stealthmax_keys::MasterSecret;
    use stealthmax_types::Address;

    use super::*;
    use crate::simulated::{Operation, SimulatedRollup};

    fn setup() -> (KeyDeriver, Arc<InMemoryDirectory>, SimulatedRollup, SettlementOrchestrator) {
        let keys = KeyDeriver::new(MasterSecret::new([0x33; 32]));
        let directory = Arc::new(InMemoryDirectory::new());
        let rollup = SimulatedRollup::new();
        let orchestrator = SettlementOrchestrator::new(
            keys.clone(),
            directory.clone(),
            Arc::new(rollup.clone()),
            SettlementConfig::default(),
        );
        (keys, directory, rollup, orchestrator)
    }

    #[tokio::test]
    async fn runner_records_every_outcome() {
        let mut attempt = SettlementAttempt::new("x", NativeAmount::from_wei(1));
        let done = attempt
            .run(SettlementStep::MasterInit, async { Ok(StepOutput::done(7)) })
            .await
            .unwrap();
        assert_eq!(done, Some(7));

        let skipped = attempt
            .run(SettlementStep::MasterRelay, async {
                Ok(StepOutput::skipped(1, "nothing to do"))
            })
            .await
            .unwrap();
        assert_eq!(skipped, Some(1));

        let best_effort: Option<()> = attempt
            .run(SettlementStep::UserDeposit, async {
                Err(StealthError::Rollup("boom".into()))
            })
            .await
            .unwrap();
        assert!(best_effort.is_none());
        assert!(attempt.abort.is_none());

        let required: Result<Option<()>> = attempt
            .run(SettlementStep::UserInit, async {
                Err(StealthError::RollupAuthentication("denied".into()))
            })
            .await;
        assert!(required.is_err());
        assert!(attempt.abort.is_some());

        let statuses: Vec<_> = attempt.steps.iter().map(|r| r.status.clone()).collect();
        assert_eq!(statuses[0], StepStatus::Completed);
        assert!(matches!(statuses[1], StepStatus::Skipped(_)));
        assert!(matches!(statuses[2], StepStatus::Failed(ref m) if m.contains("boom")));
        assert!(matches!(statuses[3], StepStatus::Failed(_)));
    }

    #[tokio::test]
    async fn manual_deposit_never_rotates() {
        let (keys, directory, rollup, orchestrator) = setup();
        let address = keys.legacy("alice").unwrap().address();
        directory
            .upsert(&NameRecord::registered("alice", address, RollupAddress::new("T6alice")))
            .await
            .unwrap();

        let result = orchestrator
            .settle_manual("alice", NativeAmount::from_ether_str("0.25").unwrap(), None)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.rotation.is_none());
        assert!(result.step_status(SettlementStep::RotateAddress).is_none());
        assert_eq!(
            result.step_status(SettlementStep::ResolveTarget),
            Some(&StepStatus::Completed)
        );
        assert_eq!(directory.get("alice").unwrap().counter, 0);
        assert_eq!(rollup.count(Operation::Deposit), 1);
    }

    #[tokio::test]
    async fn manual_deposit_without_target_is_invalid() {
        let (_keys, _directory, rollup, orchestrator) = setup();
        let err = orchestrator
            .settle_manual("ghost", NativeAmount::from_wei(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StealthError::InvalidRequest(_)));
        assert!(rollup.calls().is_empty());

        let err = orchestrator
            .settle_manual("ghost", NativeAmount::ZERO, Some(RollupAddress::new("T6g")))
            .await
            .unwrap_err();
        assert!(matches!(err, StealthError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn manual_deposit_with_explicit_target_skips_directory() {
        let (_keys, directory, _rollup, orchestrator) = setup();
        let result = orchestrator
            .settle_manual("bob", NativeAmount::from_wei(5), Some(RollupAddress::new("T6bob")))
            .await
            .unwrap();
        assert!(result.success);
        assert!(matches!(
            result.step_status(SettlementStep::ResolveTarget),
            Some(StepStatus::Skipped(_))
        ));
        assert_eq!(directory.writes(), 0);
    }

    #[tokio::test]
    async fn account_queries_always_log_out() {
        let (_keys, _directory, rollup, orchestrator) = setup();
        rollup.fail(Operation::Deposits, None, "history unavailable");

        let view = orchestrator.balances("carol").await.unwrap();
        assert_eq!(view.name.as_deref(), Some("carol"));
        assert!(view.data.is_empty());

        assert!(orchestrator.deposits("carol").await.is_err());
        assert_eq!(rollup.count(Operation::Login), 2);
        assert_eq!(rollup.count(Operation::Logout), 2);
    }

    #[tokio::test]
    async fn master_account_reports_funded_balance() {
        let (keys, _directory, rollup, orchestrator) = setup();
        let master = SimulatedRollup::account_for(keys.master().unwrap().address());
        rollup.fund(&master, 42);
        let view = orchestrator.master_account().await.unwrap();
        assert!(view.name.is_none());
        assert_eq!(view.rollup_address, master);
        assert_eq!(view.data[0].amount, 42);
    }

    #[tokio::test]
    async fn unknown_recipient_is_unassociated() {
        let (_keys, directory, rollup, orchestrator) = setup();
        let transfer = MatchedTransfer::dummy(Address([0xee; 20]), NativeAmount::from_wei(1));
        let outcome = orchestrator.settle(&transfer).await.unwrap();
        assert!(matches!(outcome, SettlementOutcome::Unassociated { .. }));
        assert!(rollup.calls().is_empty());
        assert_eq!(directory.writes(), 0);
    }

    #[tokio::test]
    async fn rotated_recipient_settles_under_monitored_name() {
        let (keys, directory, rollup, orchestrator) = setup();
        let legacy = keys.legacy("alice").unwrap().address();
        directory
            .upsert(&NameRecord::registered("alice", legacy, RollupAddress::new("T6alice")))
            .await
            .unwrap();
        let first = MatchedTransfer::dummy(legacy, NativeAmount::from_wei(3));
        let second = MatchedTransfer::dummy(legacy, NativeAmount::from_wei(4));

        let outcome = orchestrator.settle_monitored(&first, Some("alice")).await.unwrap();
        assert!(matches!(outcome, SettlementOutcome::Settled(ref r) if r.success));
        assert_eq!(directory.get("alice").unwrap().counter, 1);

        // The legacy address is now retired; only the name still leads to alice.
        let unhinted = orchestrator.settle(&second).await.unwrap();
        assert!(matches!(unhinted, SettlementOutcome::Unassociated { .. }));

        let outcome = orchestrator.settle_monitored(&second, Some("alice")).await.unwrap();
        let SettlementOutcome::Settled(result) = outcome else {
            panic!("expected a settlement cycle");
        };
        assert!(result.success);
        assert_eq!(result.name, "alice");
        let rotation = result.rotation.unwrap();
        assert_eq!(rotation.derived_from, 1);
        assert_eq!(rotation.counter, 2);
        assert_eq!(directory.get("alice").unwrap().counter, 2);
        assert_eq!(rollup.count(Operation::Deposit), 2);
    }

    #[tokio::test]
    async fn monitored_name_without_record_is_unassociated() {
        let (_keys, directory, rollup, orchestrator) = setup();
        let transfer = MatchedTransfer::dummy(Address([0xdd; 20]), NativeAmount::from_wei(1));
        let outcome = orchestrator
            .settle_monitored(&transfer, Some("gone"))
            .await
            .unwrap();
        assert!(matches!(outcome, SettlementOutcome::Unassociated { .. }));
        assert!(rollup.calls().is_empty());
        assert_eq!(directory.writes(), 0);
    }
}
