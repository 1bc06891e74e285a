//! # Account Keys
//!
//! Every seller, buyer, bidder and lien provider is an Ed25519 keypair, and
//! the 32-byte public key *is* the account's [`Address`]. There is no
//! separate public-key type: contracts check consent by verifying a
//! signature under the caller's address (see [`super::signatures`]).
//!
//! Secret key material is zeroized on drop by ed25519-dalek and never
//! reaches `Debug` output or logs.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::SIGNATURE_LENGTH;
use crate::ledger::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("secret key must be 32 hex-encoded bytes")]
    InvalidSecretKey,
}

/// An account's signing key.
///
/// Not `Serialize`: exporting a secret goes through [`ParcelKeypair::to_bytes`].
///
/// ```
/// use parcel_protocol::crypto::ParcelKeypair;
///
/// let seller = ParcelKeypair::from_seed(&[1u8; 32]);
/// assert_eq!(seller.address(), ParcelKeypair::from_seed(&[1u8; 32]).address());
/// ```
pub struct ParcelKeypair {
    signing_key: SigningKey,
}

impl ParcelKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair; the seed is the secret key.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The account address, i.e. the verifying key bytes.
    pub fn address(&self) -> Address {
        Address::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign `message`. Deterministic (RFC 8032).
    pub fn sign(&self, message: &[u8]) -> ParcelSignature {
        ParcelSignature(self.signing_key.sign(message).to_bytes())
    }

    /// Raw secret key. Handle with care.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl Clone for ParcelKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl PartialEq for ParcelKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ParcelKeypair {}

impl fmt::Debug for ParcelKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParcelKeypair({:?})", self.address())
    }
}

// ---------------------------------------------------------------------------
// ParcelSignature
// ---------------------------------------------------------------------------

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelSignature(#[serde(with = "hex_signature")] [u8; SIGNATURE_LENGTH]);

impl ParcelSignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub(crate) fn to_dalek(self) -> DalekSignature {
        DalekSignature::from_bytes(&self.0)
    }
}

impl fmt::Debug for ParcelSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "ParcelSignature({}..{})", &hex_str[..8], &hex_str[120..])
    }
}

mod hex_signature {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::config::SIGNATURE_LENGTH;

    pub fn serialize<S: Serializer>(bytes: &[u8; SIGNATURE_LENGTH], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; SIGNATURE_LENGTH], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::invalid_length(bytes.len(), &"64 bytes"))
    }
}
