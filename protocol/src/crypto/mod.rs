//! # Cryptographic Primitives for Parcel
//!
//! Every agreement signature and every contract address flows through here.
//!
//! - **Ed25519** for signatures: buyers sign the agreement hash, contracts
//!   verify it against the caller's address.
//! - **SHA-256** for the portable agreement hash.
//! - **BLAKE3** for internal, domain-separated identifiers.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{domain_separated_hash, sha256, sha256_multi};
pub use keys::{KeyError, ParcelKeypair, ParcelSignature};
pub use signatures::{verify_signer, SignatureError};
