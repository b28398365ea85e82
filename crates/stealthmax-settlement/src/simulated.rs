//! In-memory rollup ledger.
//!
//! Every [`SimulatedRollup`] client shares one ledger, so a transfer from
//! the master session is visible to the per-name session and vice versa.
//! Failures can be injected per operation and, optionally, per account.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stealthmax_keys::DerivedKeypair;
use stealthmax_types::{Address, Result, RollupAddress, StealthError};

use crate::rollup::{
    DepositParams, DepositReceipt, DepositRecord, DepositStatus, RollupClient, RollupConnector,
    RollupToken, TokenBalance, TransferFee, TransferReceipt, TransferRecord, TransferRequest,
    TransferStatus,
};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Logout,
    Tokens,
    Balances,
    Fee,
    Broadcast,
    Deposit,
    Deposits,
    Transfers,
}

/// One call observed by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub account: RollupAddress,
    pub operation: Operation,
}

#[derive(Debug, Default)]
struct Ledger {
    tokens: Vec<RollupToken>,
    balances: HashMap<RollupAddress, u128>,
    deposits: HashMap<RollupAddress, Vec<DepositRecord>>,
    transfers: HashMap<RollupAddress, Vec<TransferRecord>>,
    fee: Option<TransferFee>,
    failures: HashMap<(Operation, Option<RollupAddress>), String>,
    calls: Vec<Call>,
    sequence: u64,
}

impl Ledger {
    fn next_hash(&mut self) -> String {
        self.sequence += 1;
        format!("0x{:064x}", self.sequence)
    }

    fn enter(&mut self, account: &RollupAddress, operation: Operation) -> Result<()> {
        self.calls.push(Call {
            account: account.clone(),
            operation,
        });
        let failure = self
            .failures
            .get(&(operation, Some(account.clone())))
            .or_else(|| self.failures.get(&(operation, None)));
        match failure {
            Some(message) if operation == Operation::Login => {
                Err(StealthError::RollupAuthentication(message.clone()))
            }
            Some(message) => Err(StealthError::Rollup(message.clone())),
            None => Ok(()),
        }
    }
}

/// Shared in-memory rollup.
#[derive(Debug, Clone)]
pub struct SimulatedRollup {
    ledger: Arc<Mutex<Ledger>>,
}

impl Default for SimulatedRollup {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRollup {
    /// A ledger with the native token at index 0 and no fee.
    #[must_use]
    pub fn new() -> Self {
        let ledger = Ledger {
            tokens: vec![RollupToken::native(0)],
            ..Ledger::default()
        };
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    /// The rollup address the simulation assigns to a base-chain key.
    #[must_use]
    pub fn account_for(address: Address) -> RollupAddress {
        RollupAddress::new(format!("T{}", hex::encode(address.as_bytes())))
    }

    /// Replace the token list.
    pub fn set_tokens(&self, tokens: Vec<RollupToken>) {
        self.ledger.lock().tokens = tokens;
    }

    pub fn set_fee(&self, fee: Option<TransferFee>) {
        self.ledger.lock().fee = fee;
    }

    /// Credit `units` of the native token to `account`.
    pub fn fund(&self, account: &RollupAddress, units: u128) {
        *self.ledger.lock().balances.entry(account.clone()).or_insert(0) += units;
    }

    #[must_use]
    pub fn balance(&self, account: &RollupAddress) -> u128 {
        self.ledger.lock().balances.get(account).copied().unwrap_or(0)
    }

    /// Make `operation` fail, for `account` only or for everyone.
    pub fn fail(&self, operation: Operation, account: Option<&RollupAddress>, message: &str) {
        self.ledger
            .lock()
            .failures
            .insert((operation, account.cloned()), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.ledger.lock().failures.clear();
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.ledger.lock().calls.clone()
    }

    /// Number of calls to `operation` (from any account).
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.ledger
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    #[must_use]
    pub fn deposits_to(&self, account: &RollupAddress) -> Vec<DepositRecord> {
        self.ledger
            .lock()
            .deposits
            .get(account)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RollupConnector for SimulatedRollup {
    async fn connect(&self, keypair: &DerivedKeypair) -> Result<Box<dyn RollupClient>> {
        Ok(Box::new(SimulatedClient {
            ledger: self.ledger.clone(),
            account: Self::account_for(keypair.address()),
            session: Mutex::new(false),
        }))
    }
}

struct SimulatedClient {
    ledger: Arc<Mutex<Ledger>>,
    account: RollupAddress,
    session: Mutex<bool>,
}

impl SimulatedClient {
    /// Enter `operation`, requiring an active session.
    fn authed(&self, operation: Operation) -> Result<parking_lot::MutexGuard<'_, Ledger>> {
        let mut ledger = self.ledger.lock();
        ledger.enter(&self.account, operation)?;
        if !*self.session.lock() {
            return Err(StealthError::Rollup("not logged in".into()));
        }
        Ok(ledger)
    }
}

#[async_trait]
impl RollupClient for SimulatedClient {
    async fn login(&self) -> Result<RollupAddress> {
        self.ledger.lock().enter(&self.account, Operation::Login)?;
        *self.session.lock() = true;
        Ok(self.account.clone())
    }

    async fn logout(&self) -> Result<()> {
        self.ledger.lock().enter(&self.account, Operation::Logout)?;
        *self.session.lock() = false;
        Ok(())
    }

    async fn tokens(&self) -> Result<Vec<RollupToken>> {
        Ok(self.authed(Operation::Tokens)?.tokens.clone())
    }

    async fn token_balances(&self) -> Result<Vec<TokenBalance>> {
        let ledger = self.authed(Operation::Balances)?;
        let amount = ledger.balances.get(&self.account).copied().unwrap_or(0);
        Ok(ledger
            .tokens
            .iter()
            .filter(|t| t.is_native() && amount > 0)
            .map(|t| TokenBalance {
                token_index: t.token_index,
                amount,
            })
            .collect())
    }

    async fn transfer_fee(&self) -> Result<Option<TransferFee>> {
        Ok(self.authed(Operation::Fee)?.fee.clone())
    }

    async fn broadcast_transaction(
        &self,
        transfers: &[TransferRequest],
    ) -> Result<TransferReceipt> {
        let mut ledger = self.authed(Operation::Broadcast)?;
        let fee = ledger.fee.as_ref().map_or(0, |f| f.amount);
        let mut legs = Vec::with_capacity(transfers.len());
        let mut total = fee;
        for transfer in transfers {
            let units = transfer.amount.to_units(transfer.token.decimals())?;
            total = total.saturating_add(units);
            legs.push((transfer.address.clone(), transfer.token.token_index, units));
        }
        let available = ledger.balances.get(&self.account).copied().unwrap_or(0);
        if available < total {
            return Err(StealthError::Rollup(format!(
                "insufficient balance: {available} < {total}"
            )));
        }
        ledger.balances.insert(self.account.clone(), available - total);
        let tx_hash = ledger.next_hash();
        for (recipient, token_index, units) in legs {
            *ledger.balances.entry(recipient.clone()).or_insert(0) += units;
            ledger
                .transfers
                .entry(self.account.clone())
                .or_default()
                .push(TransferRecord {
                    tx_hash: Some(tx_hash.clone()),
                    token_index,
                    amount: units,
                    recipient,
                    status: TransferStatus::Success,
                });
        }
        Ok(TransferReceipt {
            tx_hash: Some(tx_hash),
        })
    }

    async fn deposit(&self, params: &DepositParams) -> Result<DepositReceipt> {
        let mut ledger = self.authed(Operation::Deposit)?;
        let tx_hash = ledger.next_hash();
        *ledger.balances.entry(params.address.clone()).or_insert(0) += params.amount;
        let record = DepositRecord {
            tx_hash: Some(tx_hash.clone()),
            token_index: params.token.token_index,
            amount: params.amount,
            status: DepositStatus::Completed,
        };
        ledger
            .deposits
            .entry(params.address.clone())
            .or_default()
            .push(record.clone());
        if params.address != self.account {
            ledger
                .deposits
                .entry(self.account.clone())
                .or_default()
                .push(record);
        }
        Ok(DepositReceipt { tx_hash })
    }

    async fn deposits(&self) -> Result<Vec<DepositRecord>> {
        let ledger = self.authed(Operation::Deposits)?;
        Ok(ledger.deposits.get(&self.account).cloned().unwrap_or_default())
    }

    async fn transfers(&self) -> Result<Vec<TransferRecord>> {
        let ledger = self.authed(Operation::Transfers)?;
        Ok(ledger.transfers.get(&self.account).cloned().unwrap_or_default())
    }
}
