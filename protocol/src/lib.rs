// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Parcel Protocol: Core Library
//!
//! The ground the settlement contracts stand on: keys and signatures, the
//! agreement hash buyers sign, and an in-memory ledger hosting the payment
//! tokens, deed registries and KYC registries that a property sale moves
//! value through.
//!
//! ## Architecture
//!
//! - **crypto**: Ed25519 keys and signatures, SHA-256 and BLAKE3 hashing.
//! - **agreement**: The canonical agreement hash and its signature checks.
//! - **ledger**: Addresses, the block clock, tokens, deeds and credentials.
//! - **config**: Protocol constants and per-deployment platform settings.
//! - **logging**: `tracing` subscriber setup.
//!
//! ## Design Philosophy
//!
//! 1. A call either happens completely or not at all.
//! 2. Checked arithmetic everywhere money moves.
//! 3. If it touches money, it has tests. Plural.

pub mod agreement;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod logging;

pub use ledger::{Address, CallContext, Ledger, LedgerError, Timestamp};
