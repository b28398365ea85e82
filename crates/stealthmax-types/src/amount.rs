//! Native-asset amounts.
//!
//! Amounts are carried as integer wei ([`NativeAmount`]) end to end. Decimal
//! text (e.g. `"1.5"`) only appears at the edges: API input, log output, and
//! the JSON form of settlement results. Conversion into the rollup's
//! smallest unit rounds half away from zero.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, StealthError, constants};

/// An amount of the base chain's native asset, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct NativeAmount(u128);

impl NativeAmount {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    #[must_use]
    pub const fn wei(&self) -> u128 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a decimal ether string such as `"1.5"`.
    ///
    /// # Errors
    /// `AmountConversion` for negative values, more than 18 fractional
    /// digits, or values that overflow `u128` wei.
    pub fn from_ether_str(s: &str) -> Result<Self> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| StealthError::AmountConversion(format!("{s}: {e}")))?;
        Self::from_ether(value)
    }

    /// Convert a decimal ether value into wei.
    pub fn from_ether(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() {
            return Err(StealthError::AmountConversion(format!(
                "negative amount {value}"
            )));
        }
        if value.scale() > constants::NATIVE_DECIMALS {
            return Err(StealthError::AmountConversion(format!(
                "{value} has more than {} fractional digits",
                constants::NATIVE_DECIMALS
            )));
        }
        // Work on the mantissa directly so large amounts never pass through
        // Decimal's 96-bit multiply.
        let mantissa = u128::try_from(value.mantissa())
            .map_err(|_| StealthError::AmountConversion(format!("{value}")))?;
        let factor = pow10(constants::NATIVE_DECIMALS - value.scale())?;
        mantissa
            .checked_mul(factor)
            .map(Self)
            .ok_or_else(|| StealthError::AmountConversion(format!("{value} overflows wei")))
    }

    /// The amount as a decimal number of ether, if it fits in a `Decimal`.
    pub fn to_ether(&self) -> Result<Decimal> {
        let wei = i128::try_from(self.0)
            .map_err(|_| StealthError::AmountConversion(format!("{} wei", self.0)))?;
        Decimal::try_from_i128_with_scale(wei, constants::NATIVE_DECIMALS)
            .map(|d| d.normalize())
            .map_err(|e| StealthError::AmountConversion(format!("{} wei: {e}", self.0)))
    }

    /// Express this amount in the smallest unit of a token with `decimals`
    /// decimal places, rounding to the nearest unit (half away from zero).
    pub fn to_units(&self, decimals: u32) -> Result<u128> {
        let native = constants::NATIVE_DECIMALS;
        if decimals >= native {
            let factor = pow10(decimals - native)?;
            return self.0.checked_mul(factor).ok_or_else(|| {
                StealthError::AmountConversion(format!("{} wei at {decimals} decimals", self.0))
            });
        }
        let divisor = pow10(native - decimals)?;
        let quotient = self.0 / divisor;
        let remainder = self.0 % divisor;
        if remainder >= divisor - remainder {
            Ok(quotient + 1)
        } else {
            Ok(quotient)
        }
    }

    /// Build an amount from a token balance expressed in units with
    /// `decimals` decimal places. Sub-wei precision is truncated.
    pub fn from_units(units: u128, decimals: u32) -> Result<Self> {
        let native = constants::NATIVE_DECIMALS;
        if decimals >= native {
            Ok(Self(units / pow10(decimals - native)?))
        } else {
            units
                .checked_mul(pow10(native - decimals)?)
                .map(Self)
                .ok_or_else(|| StealthError::AmountConversion(format!("{units} units")))
        }
    }

    /// Exact ether rendering with trailing zeros trimmed (`1.5`, `0.000001`, `2`).
    #[must_use]
    pub fn format_ether(&self) -> String {
        let base = 10u128.pow(constants::NATIVE_DECIMALS);
        let whole = self.0 / base;
        let frac = self.0 % base;
        if frac == 0 {
            return whole.to_string();
        }
        let digits = format!("{frac:018}");
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

fn pow10(exp: u32) -> Result<u128> {
    10u128
        .checked_pow(exp)
        .ok_or_else(|| StealthError::AmountConversion(format!("10^{exp} overflows")))
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_ether())
    }
}

impl FromStr for NativeAmount {
    type Err = StealthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_ether_str(s)
    }
}

impl Serialize for NativeAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NativeAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_ether_str(&s).map_err(serde::de::Error::custom)
    }
}
