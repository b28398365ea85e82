//! Settlement cycle types.
//!
//! A cycle walks the fixed sequence of [`SettlementStep`]s. Each step has a
//! [`StepPolicy`] deciding whether its failure ends the cycle or is logged
//! and skipped. The outcome of every step is kept in the cycle's trail so
//! callers can see exactly how far a partially completed cycle got.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, CycleId, NativeAmount, RollupAddress};

/// The steps of one settlement cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStep {
    /// Look up the name record for the recipient address.
    ResolveTarget,
    /// Authenticate the master rollup session.
    MasterInit,
    /// Pre-fund the user's rollup account from master, when master can afford it.
    MasterRelay,
    /// Release the master session.
    MasterLogout,
    /// Authenticate the per-name rollup session.
    UserInit,
    /// Deposit the received amount from the user identity to master.
    UserDeposit,
    /// Advance the name to its next one-time address.
    RotateAddress,
    /// Release the per-name session.
    UserLogout,
}

impl SettlementStep {
    /// Every step, in execution order.
    pub const ALL: [Self; 8] = [
        Self::ResolveTarget,
        Self::MasterInit,
        Self::MasterRelay,
        Self::MasterLogout,
        Self::UserInit,
        Self::UserDeposit,
        Self::RotateAddress,
        Self::UserLogout,
    ];

    /// Whether a failure of this step aborts the cycle.
    #[must_use]
    pub fn policy(self) -> StepPolicy {
        match self {
            Self::ResolveTarget | Self::MasterInit | Self::UserInit => StepPolicy::Required,
            Self::MasterRelay
            | Self::MasterLogout
            | Self::UserDeposit
            | Self::RotateAddress
            | Self::UserLogout => StepPolicy::BestEffort,
        }
    }

    /// 1-based position in the cycle, as used in log lines.
    #[must_use]
    pub fn ordinal(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }
}

impl fmt::Display for SettlementStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ResolveTarget => "RESOLVE_TARGET",
            Self::MasterInit => "MASTER_INIT",
            Self::MasterRelay => "MASTER_RELAY",
            Self::MasterLogout => "MASTER_LOGOUT",
            Self::UserInit => "USER_INIT",
            Self::UserDeposit => "USER_DEPOSIT",
            Self::RotateAddress => "ROTATE_ADDRESS",
            Self::UserLogout => "USER_LOGOUT",
        };
        f.write_str(label)
    }
}

/// How the step runner treats a failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPolicy {
    /// Failure ends the cycle.
    Required,
    /// Failure is logged and the cycle continues.
    BestEffort,
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// The step decided not to act (e.g. master balance too low).
    Skipped(String),
    Failed(String),
}

/// Trail entry for one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: SettlementStep,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// The directory write performed by a successful rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationOutcome {
    /// Counter the new address was derived from.
    pub derived_from: u64,
    /// Counter now stored for the name.
    pub counter: u64,
    /// Receiving address now stored for the name.
    pub address: Address,
    /// Compare-and-swap attempts used.
    pub attempts: u32,
}

/// Result of one settlement cycle that reached a managed name.
///
/// `success` reports the user deposit only. Rotation is attempted
/// regardless and its outcome is reported separately in `rotation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub cycle_id: CycleId,
    pub name: String,
    pub success: bool,
    /// Rollup transaction hash of the user deposit.
    pub tx_hash: Option<String>,
    /// Master's rollup address (the deposit target). Empty if the cycle
    /// aborted before the master session was established.
    pub settlement_address: RollupAddress,
    pub amount: NativeAmount,
    pub error: Option<String>,
    pub rotation: Option<RotationOutcome>,
    pub steps: Vec<StepRecord>,
}

impl SettlementResult {
    /// Status recorded for `step`, if the cycle reached it.
    #[must_use]
    pub fn step_status(&self, step: SettlementStep) -> Option<&StepStatus> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.status)
    }
}

/// Outcome of handing one matched transfer to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The recipient is not a managed name; nothing was done.
    Unassociated { recipient: Address },
    /// A cycle ran; see the result for how far it got.
    Settled(SettlementResult),
}

impl SettlementOutcome {
    #[must_use]
    pub fn result(&self) -> Option<&SettlementResult> {
        match self {
            Self::Settled(result) => Some(result),
            Self::Unassociated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_steps_are_the_abort_points() {
        let required: Vec<_> = SettlementStep::ALL
            .iter()
            .filter(|s| s.policy() == StepPolicy::Required)
            .copied()
            .collect();
        assert_eq!(
            required,
            vec![
                SettlementStep::ResolveTarget,
                SettlementStep::MasterInit,
                SettlementStep::UserInit
            ]
        );
    }

    #[test]
    fn ordinals_follow_execution_order() {
        assert_eq!(SettlementStep::ResolveTarget.ordinal(), 1);
        assert_eq!(SettlementStep::UserDeposit.ordinal(), 6);
        assert_eq!(SettlementStep::UserLogout.ordinal(), 8);
    }

    #[test]
    fn step_display() {
        assert_eq!(SettlementStep::RotateAddress.to_string(), "ROTATE_ADDRESS");
    }

    #[test]
    fn step_record_serializes_flat() {
        let record = StepRecord {
            step: SettlementStep::MasterRelay,
            status: StepStatus::Skipped("insufficient master balance".into()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["step"], "MasterRelay");
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["detail"], "insufficient master balance");
    }
}
