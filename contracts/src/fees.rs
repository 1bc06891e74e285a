//! # Fees & Settlement Receipts
//!
//! Every successful settlement splits its gross amount three ways:
//!
//! ```text
//! gross = fee + lien_payoff + seller_proceeds
//! fee   = floor(gross / fee_divisor)
//! ```
//!
//! The split is computed before any money moves, so a sale that cannot cover
//! its lien is rejected without touching a balance.

use chrono::{DateTime, Utc};
use parcel_protocol::config::ConfigError;
use parcel_protocol::ledger::{Address, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SettlementError;

/// How a settlement's gross amount is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: u64,
    pub fee: u64,
    pub lien_payoff: u64,
    pub seller_proceeds: u64,
}

impl FeeSplit {
    /// Split `gross`, reserving `lien_payoff` for the lien provider.
    ///
    /// # Errors
    ///
    /// [`SettlementError::InsufficientFundsForLien`] if `gross` cannot cover
    /// the lien and the fee together.
    pub fn compute(gross: u64, lien_payoff: u64, fee_divisor: u64) -> Result<Self, SettlementError> {
        if fee_divisor == 0 {
            return Err(ConfigError::ZeroFeeDivisor.into());
        }
        let fee = gross / fee_divisor;
        let required = lien_payoff
            .checked_add(fee)
            .ok_or(SettlementError::AmountOverflow)?;
        let seller_proceeds =
            gross
                .checked_sub(required)
                .ok_or(SettlementError::InsufficientFundsForLien {
                    price: gross,
                    lien_balance: lien_payoff,
                    fee,
                })?;
        Ok(Self {
            gross,
            fee,
            lien_payoff,
            seller_proceeds,
        })
    }
}

/// Which contract produced a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementKind {
    Sale,
    Auction,
    Fractional,
}

impl std::fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementKind::Sale => write!(f, "Sale"),
            SettlementKind::Auction => write!(f, "Auction"),
            SettlementKind::Fractional => write!(f, "Fractional"),
        }
    }
}

/// Record of a completed settlement, returned by `execute`/`close`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub receipt_id: Uuid,
    pub kind: SettlementKind,
    /// Token id for sales and auctions, listing id for fractional sales.
    pub subject: u64,
    pub seller: Address,
    /// `None` for fractional sales, which have many buyers.
    pub buyer: Option<Address>,
    pub payment_token: Address,
    pub admin: Address,
    pub split: FeeSplit,
    pub settled_at: DateTime<Utc>,
}

impl SettlementReceipt {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kind: SettlementKind,
        subject: u64,
        seller: Address,
        buyer: Option<Address>,
        payment_token: Address,
        admin: Address,
        split: FeeSplit,
        now: Timestamp,
    ) -> Self {
        Self {
            receipt_id: Uuid::new_v4(),
            kind,
            subject,
            seller,
            buyer,
            payment_token,
            admin,
            split,
            settled_at: parcel_protocol::ledger::timestamp_to_utc(now),
        }
    }
}
