//! # Protocol Configuration & Constants
//!
//! Every magic number in Parcel lives here. If a contract hardcodes a fee
//! rate or a domain tag somewhere else, it is a bug waiting for an audit.
//!
//! Constants that define the wire-level agreement format are consensus
//! critical: changing [`AGREEMENT_DOMAIN_TAG`] invalidates every signature
//! buyers have ever produced. Platform parameters that differ between
//! deployments (who collects the fee) live in [`PlatformConfig`] and are
//! handed to each contract at construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Address;

// ---------------------------------------------------------------------------
// Settlement Parameters
// ---------------------------------------------------------------------------

/// Platform fee divisor. Every successful settlement pays `amount / 200`
/// (0.5%, rounded down) to the platform account.
pub const FEE_DIVISOR: u64 = 200;

/// Upper bound on agreement text stored on a deed or listing. Long enough
/// for a lease summary, short enough that hashing it stays trivial.
pub const MAX_AGREEMENT_TEXT_LEN: usize = 4096;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Address length in bytes. Equal to an Ed25519 verifying key.
pub const ADDRESS_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Hash output length in bytes. SHA-256 and BLAKE3 both produce 32.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Domain tag prepended to every agreement hash preimage. ASCII, no
/// terminator, exactly 19 bytes.
pub const AGREEMENT_DOMAIN_TAG: &[u8] = b"PARCEL-AGREEMENT-V1";

/// BLAKE3 `derive_key` context for contract addresses.
pub const CONTRACT_ADDRESS_CONTEXT: &str = "parcel contract address v1";

// ---------------------------------------------------------------------------
// Platform Configuration
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`PlatformConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed platform config: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("fee divisor must be non-zero")]
    ZeroFeeDivisor,
}

/// Deployment-specific parameters injected into every settlement contract.
///
/// Each contract holds its own copy, so platforms deployed on one ledger
/// may use different fee accounts and divisors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Account that receives the settlement fee and operates the
    /// fractional factory.
    pub admin: Address,
    /// Fee divisor applied to settlement amounts.
    #[serde(default = "default_fee_divisor")]
    pub fee_divisor: u64,
}

fn default_fee_divisor() -> u64 {
    FEE_DIVISOR
}

impl PlatformConfig {
    /// Config with the standard 0.5% fee paid to `admin`.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            fee_divisor: FEE_DIVISOR,
        }
    }

    /// Parse and validate a JSON config document.
    ///
    /// ```
    /// use parcel_protocol::config::{PlatformConfig, FEE_DIVISOR};
    ///
    /// let json = format!(r#"{{"admin":"{}"}}"#, "11".repeat(32));
    /// let cfg = PlatformConfig::from_json(&json).unwrap();
    /// assert_eq!(cfg.fee_divisor, FEE_DIVISOR);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would divide by zero at settlement time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fee_divisor == 0 {
            return Err(ConfigError::ZeroFeeDivisor);
        }
        Ok(())
    }
}
