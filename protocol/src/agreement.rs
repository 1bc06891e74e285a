//! # Agreement Signatures
//!
//! A buyer consents to a property's agreement text by signing a hash that
//! binds the text to one specific sale and one specific signer:
//!
//! ```text
//! SHA-256(
//!     "PARCEL-AGREEMENT-V1"      19 bytes, ASCII
//!     sale_id                    u64, big-endian
//!     signer                     32-byte address
//!     len(text)                  u32, big-endian
//!     text                       UTF-8
//! )
//! ```
//!
//! The sale id stops a signature from one listing being replayed against
//! another, and the signer address stops one buyer's signature being
//! presented by somebody else. The length prefix makes the encoding
//! unambiguous even though the text is last.
//!
//! The signature is plain Ed25519 over those 32 bytes. Since an address is
//! the signer's public key, checking consent is just verifying under the
//! expected address.

use thiserror::Error;

use crate::config::{AGREEMENT_DOMAIN_TAG, MAX_AGREEMENT_TEXT_LEN};
use crate::crypto::hash::sha256_multi;
use crate::crypto::keys::{ParcelKeypair, ParcelSignature};
use crate::crypto::signatures::verify_signer;
use crate::ledger::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgreementError {
    #[error("agreement text is {len} bytes, limit is {max}")]
    TextTooLong { len: usize, max: usize },
}

/// The 32-byte digest a buyer signs for `sale_id`.
pub fn agreement_hash(sale_id: u64, signer: &Address, text: &str) -> [u8; 32] {
    // Texts are bounded well below u32::MAX at mint time; saturate anyway so
    // an oversized text still hashes deterministically.
    let len = u32::try_from(text.len()).unwrap_or(u32::MAX);
    sha256_multi(&[
        AGREEMENT_DOMAIN_TAG,
        &sale_id.to_be_bytes(),
        signer.as_bytes(),
        &len.to_be_bytes(),
        text.as_bytes(),
    ])
}

/// Sign `text` for `sale_id` as `keypair`.
///
/// ```
/// use parcel_protocol::agreement::{agreement_hash, sign_agreement, verify_agreement};
/// use parcel_protocol::crypto::ParcelKeypair;
///
/// let buyer = ParcelKeypair::from_seed(&[3u8; 32]);
/// let sig = sign_agreement(&buyer, 1, "I accept the lease").unwrap();
/// let digest = agreement_hash(1, &buyer.address(), "I accept the lease");
/// assert!(verify_agreement(&sig, &digest, &buyer.address()));
/// ```
pub fn sign_agreement(
    keypair: &ParcelKeypair,
    sale_id: u64,
    text: &str,
) -> Result<ParcelSignature, AgreementError> {
    if text.len() > MAX_AGREEMENT_TEXT_LEN {
        return Err(AgreementError::TextTooLong {
            len: text.len(),
            max: MAX_AGREEMENT_TEXT_LEN,
        });
    }
    let digest = agreement_hash(sale_id, &keypair.address(), text);
    Ok(keypair.sign(&digest))
}

/// Does `signature` over `digest` come from `expected`?
///
/// Nobody holds a secret key for a derived contract address, so a
/// contract can never appear to have signed.
pub fn verify_agreement(signature: &ParcelSignature, digest: &[u8; 32], expected: &Address) -> bool {
    verify_signer(expected, digest, signature).is_ok()
}
