//! # Signature Verification
//!
//! Verifying "did `signer` sign this?" where `signer` is a ledger address.
//!
//! Verification uses dalek's strict mode, which rejects small-order keys and
//! non-canonical signatures. Contract addresses are BLAKE3 outputs with no
//! secret key behind them; whether or not their bytes decode to a curve
//! point, nothing can produce a valid signature for them.

use ed25519_dalek::VerifyingKey;
use thiserror::Error;

use super::keys::ParcelSignature;
use crate::ledger::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("address {0} is not an Ed25519 public key")]
    NotAKey(Address),

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Check that `signature` over `message` was made by the account at `signer`.
///
/// ```
/// use parcel_protocol::crypto::{verify_signer, ParcelKeypair};
///
/// let buyer = ParcelKeypair::from_seed(&[9u8; 32]);
/// let sig = buyer.sign(b"buy deed 1");
/// assert!(verify_signer(&buyer.address(), b"buy deed 1", &sig).is_ok());
/// ```
pub fn verify_signer(
    signer: &Address,
    message: &[u8],
    signature: &ParcelSignature,
) -> Result<(), SignatureError> {
    let key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|_| SignatureError::NotAKey(*signer))?;
    key.verify_strict(message, &signature.to_dalek())
        .map_err(|_| SignatureError::VerificationFailed)
}
