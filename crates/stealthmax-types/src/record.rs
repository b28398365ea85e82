//! Name records and observed transfers.
//!
//! A [`NameRecord`] is the directory's view of one managed subname: where
//! it currently receives payments on the base chain, where its funds live
//! on the rollup, and how many rotations it has been through. The registry
//! stores the rollup half of the record inside the `description` text
//! record, decoded here by [`Description::decode`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Address, NativeAmount, RollupAddress, TxHash};

// ---------------------------------------------------------------------------
// NameRecord
// ---------------------------------------------------------------------------

/// One managed subname.
///
/// Invariants:
/// - `receiving_address` is the key-derivation output for this name at the
///   record's current position (legacy mode at registration, counter mode
///   after every rotation).
/// - `counter` only ever increases, by exactly one per completed rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    /// Subname label, without the parent domain.
    pub name: String,
    /// Current one-time receiving address on the base chain.
    pub receiving_address: Address,
    /// Number of rotations performed so far.
    pub counter: u64,
    /// The user's own account on the rollup.
    pub settlement_address: RollupAddress,
}

impl NameRecord {
    /// A freshly registered record (counter zero).
    #[must_use]
    pub fn registered(
        name: impl Into<String>,
        receiving_address: Address,
        settlement_address: RollupAddress,
    ) -> Self {
        Self {
            name: name.into(),
            receiving_address,
            counter: 0,
            settlement_address,
        }
    }

    /// The record after one rotation to `new_address`.
    ///
    /// `settlement_address` is carried over unchanged.
    #[must_use]
    pub fn rotated(&self, new_address: Address) -> Self {
        Self {
            name: self.name.clone(),
            receiving_address: new_address,
            counter: self.counter + 1,
            settlement_address: self.settlement_address.clone(),
        }
    }

    /// Fully qualified name under `domain` (e.g. `alice.stealthmax.eth`).
    #[must_use]
    pub fn fqdn(&self, domain: &str) -> String {
        format!("{}.{domain}", self.name)
    }

    /// The text-record payload that stores this record's rollup half.
    #[must_use]
    pub fn description(&self) -> Description {
        Description::Structured {
            intmax_address: self.settlement_address.clone(),
            nonce: self.counter,
        }
    }
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

/// Decoded `description` text record.
///
/// Current entries hold `{"intmax_address": "...", "nonce": n}`. Entries
/// written before rotation existed hold only the bare rollup address, which
/// implies a nonce of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Description {
    Structured {
        intmax_address: RollupAddress,
        nonce: u64,
    },
    BareAddress(RollupAddress),
}

#[derive(Serialize)]
struct StructuredDescription<'a> {
    intmax_address: &'a str,
    nonce: u64,
}

impl Description {
    /// Decode a raw text record.
    ///
    /// A field that parses as JSON must be an object with a non-empty
    /// string `intmax_address`; `nonce` may be a number or a numeric
    /// string and defaults to zero when absent, `null`, `false` or `""`.
    /// Any other JSON, including a nonce that cannot be read, yields `None`
    /// so the name is treated as unmanaged instead of reusing a counter.
    /// Text that is not JSON at all is a bare legacy address. An empty
    /// field is unmanaged.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let Ok(parsed) = serde_json::from_str::<Value>(raw) else {
            return Some(Self::BareAddress(RollupAddress::new(raw)));
        };
        let fields = parsed.as_object()?;
        let intmax_address = fields
            .get("intmax_address")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|a| !a.is_empty())?;
        let nonce = decode_nonce(fields.get("nonce"))?;
        Some(Self::Structured {
            intmax_address: RollupAddress::new(intmax_address),
            nonce,
        })
    }

    /// Encode as the structured JSON form. Bare addresses are upgraded to
    /// the structured form with nonce zero.
    #[must_use]
    pub fn encode(&self) -> String {
        let payload = StructuredDescription {
            intmax_address: self.settlement_address().as_str(),
            nonce: self.counter(),
        };
        // Serializing a struct of a String and an integer cannot fail.
        serde_json::to_string(&payload).unwrap_or_default()
    }

    #[must_use]
    pub fn settlement_address(&self) -> &RollupAddress {
        match self {
            Self::Structured { intmax_address, .. } => intmax_address,
            Self::BareAddress(address) => address,
        }
    }

    #[must_use]
    pub fn counter(&self) -> u64 {
        match self {
            Self::Structured { nonce, .. } => *nonce,
            Self::BareAddress(_) => 0,
        }
    }

    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::BareAddress(_))
    }
}

fn decode_nonce(value: Option<&Value>) -> Option<u64> {
    match value {
        None | Some(Value::Null | Value::Bool(false)) => Some(0),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

// ---------------------------------------------------------------------------
// MatchedTransfer
// ---------------------------------------------------------------------------

/// A native-asset transfer to a monitored address, as seen in one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedTransfer {
    pub recipient: Address,
    pub sender: Address,
    pub amount: NativeAmount,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

#[cfg(any(test, feature = "test-helpers"))]
impl NameRecord {
    /// Create a dummy record with a random receiving address.
    pub fn dummy(name: &str) -> Self {
        Self::registered(
            name,
            Address(rand::random()),
            RollupAddress::new(format!("T{name}")),
        )
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl MatchedTransfer {
    /// Create a dummy transfer to `recipient` with a random sender and hash.
    pub fn dummy(recipient: Address, amount: NativeAmount) -> Self {
        Self {
            recipient,
            sender: Address(rand::random()),
            amount,
            tx_hash: TxHash(rand::random()),
            block_number: 1,
        }
    }
}
