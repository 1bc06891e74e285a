//! Ledger addresses.
//!
//! An externally owned account's address is its Ed25519 public key. Contract
//! addresses are BLAKE3-derived from a kind and a label, so no secret key
//! exists for them.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::config::{ADDRESS_LENGTH, CONTRACT_ADDRESS_CONTEXT};
use crate::crypto::hash::domain_separated_hash;

/// A 32-byte account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Wrap raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive a contract address.
    ///
    /// Preimage: `kind || 0x00 || label`. The zero byte keeps
    /// `("ab", "c")` and `("a", "bc")` apart.
    pub fn contract(kind: &str, label: &str) -> Self {
        let mut preimage = Vec::with_capacity(kind.len() + 1 + label.len());
        preimage.extend_from_slice(kind.as_bytes());
        preimage.push(0);
        preimage.extend_from_slice(label.as_bytes());
        Self(domain_separated_hash(CONTRACT_ADDRESS_CONTEXT, &preimage))
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..16])
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(de::Error::custom)
    }
}
