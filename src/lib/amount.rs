//! Arbitrary-width amounts and the hex/decimal encodings used on every
//! persisted and exposed surface.
//!
//! Amounts are carried as [`U256`] and always cross a serialization boundary
//! as base-10 strings so that consumers never have to round-trip them through
//! a floating point type.

use alloy_primitives::{Address, B256, U256, hex};

use crate::error::{IndexError, Result};

/// Lowercase `0x`-prefixed rendering of an address; the investor summary id.
pub fn address_id(address: &Address) -> String {
    hex::encode_prefixed(address.as_slice())
}

pub fn hash_hex(hash: &B256) -> String {
    hex::encode_prefixed(hash.as_slice())
}

pub fn parse_amount(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IndexError::MalformedEvent("empty amount".into()));
    }
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(digits) => U256::from_str_radix(digits, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|err| IndexError::MalformedEvent(format!("invalid amount '{raw}': {err}")))
}

pub fn checked_sum(lhs: U256, rhs: U256, what: &str) -> Result<U256> {
    lhs.checked_add(rhs)
        .ok_or_else(|| IndexError::Overflow(what.to_string()))
}

pub mod decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Text(raw) => super::parse_amount(&raw).map_err(D::Error::custom),
            Repr::Number(value) => Ok(U256::from(value)),
        }
    }
}
