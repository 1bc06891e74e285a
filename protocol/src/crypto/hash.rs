//! # Hashing Utilities
//!
//! Two hash functions, each with one job:
//!
//! - **SHA-256** for the agreement hash. Signatures over it must be portable
//!   to any other implementation of the agreement scheme, and SHA-256 is the
//!   hash everyone already has.
//!
//! - **BLAKE3** for internal identifiers (contract addresses). Nothing
//!   outside this workspace needs to reproduce them, so we take the faster
//!   hash and its built-in domain separation.

use sha2::{Digest, Sha256};

use crate::config::HASH_OUTPUT_LENGTH;

/// Compute the SHA-256 hash of the input data as a fixed-size array.
///
/// ```
/// use parcel_protocol::crypto::sha256;
///
/// assert_eq!(sha256(b"parcel").len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; HASH_OUTPUT_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut output = [0u8; HASH_OUTPUT_LENGTH];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// SHA-256 over several parts fed in order, without concatenating them.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; HASH_OUTPUT_LENGTH] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; HASH_OUTPUT_LENGTH];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Domain-separated BLAKE3 using `derive_key` mode.
///
/// `domain_separated_hash("a", x)` and `domain_separated_hash("b", x)` never
/// collide, because the context string selects a different internal IV.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; HASH_OUTPUT_LENGTH] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
