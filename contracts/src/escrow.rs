//! # Escrow Sales Contract
//!
//! Whole-property sale to a single buyer under a time window:
//!
//! 1. **List**: the seller hands the deed to the contract and names a price
//!    and a window. The window opens immediately.
//! 2. **Buy**: a buyer signs the deed's agreement text for this token id and
//!    deposits the price. The record becomes `PurchasePending`.
//! 3. **Execute**: the seller settles before the window closes. The fee goes
//!    to the platform, the lien (if the deed carries one) is paid off from the
//!    deed's reserve and then from the proceeds, the rest goes to the seller
//!    and the deed goes to the buyer.
//!
//! Once the window has closed without settlement either side can unwind:
//! the seller with [`SalesContract::revert_seller`] (deed back, buyer
//! refunded, record cleared) or the buyer with
//! [`SalesContract::revert_buyer`] (same transfers, record left as a
//! `Cancelled` tombstone).
//!
//! "Open" always means `now < window_end` and "closed" means
//! `now >= window_end`, with `now` read once per call.
//!
//! Records are keyed by [`DeedKey`], the registry plus the token id. A deed
//! can have at most one active (listed or pending) sale; a cleared or
//! cancelled one can be relisted.

use parcel_protocol::config::PlatformConfig;
use parcel_protocol::crypto::ParcelSignature;
use parcel_protocol::ledger::{
    rollback_on_error, Address, CallContext, DeedId, DeedKey, Ledger, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::consent::require_consent;
use crate::custody::{atomically, Custody};
use crate::error::{require_closed, require_open, SettlementError};
use crate::fees::{FeeSplit, SettlementKind, SettlementReceipt};
use crate::lien::LienBook;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle of a sale record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleState {
    /// No record, or the record was settled or reverted by the seller.
    None,
    /// Deed in custody, waiting for a buyer.
    Listed,
    /// Buyer's payment and the deed are both in custody.
    PurchasePending,
    /// Buyer walked away after the window closed. Holds no assets.
    Cancelled,
}

impl SaleState {
    /// Listed or pending: the record holds assets.
    pub fn is_active(self) -> bool {
        matches!(self, SaleState::Listed | SaleState::PurchasePending)
    }
}

impl std::fmt::Display for SaleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaleState::None => write!(f, "None"),
            SaleState::Listed => write!(f, "Listed"),
            SaleState::PurchasePending => write!(f, "PurchasePending"),
            SaleState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// What a seller asks for when listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTerms {
    pub deed_registry: Address,
    pub token_id: DeedId,
    pub payment_token: Address,
    pub price: u64,
    /// Seconds from listing until the window closes.
    pub window_duration: u64,
}

impl SaleTerms {
    pub fn deed(&self) -> DeedKey {
        DeedKey::new(self.deed_registry, self.token_id)
    }
}

/// One property sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub token_id: DeedId,
    pub deed_registry: Address,
    pub seller: Address,
    pub buyer: Option<Address>,
    /// If set, only this account may buy.
    pub designated_buyer: Option<Address>,
    pub payment_token: Address,
    pub price: u64,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub state: SaleState,
}

impl SaleRecord {
    pub fn deed(&self) -> DeedKey {
        DeedKey::new(self.deed_registry, self.token_id)
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SalesContract {
    custody: Custody,
    config: PlatformConfig,
    sales: BTreeMap<DeedKey, SaleRecord>,
}

impl SalesContract {
    /// Deploy a new escrow contract at a fresh ledger address.
    pub fn deploy(ledger: &mut Ledger, config: PlatformConfig) -> Result<Self, SettlementError> {
        config.validate()?;
        let address = ledger.allocate_address("escrow");
        tracing::info!(%address, admin = %config.admin, "escrow contract deployed");
        Ok(Self {
            custody: Custody::new(address),
            config,
            sales: BTreeMap::new(),
        })
    }

    /// The contract's own address. Sellers approve it for their deed and
    /// buyers approve it for the price.
    pub fn address(&self) -> Address {
        self.custody.holder()
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn get_property(&self, deed: DeedKey) -> Option<&SaleRecord> {
        self.sales.get(&deed)
    }

    /// State of the sale for `deed`; `None` when there is no record.
    pub fn state_of(&self, deed: DeedKey) -> SaleState {
        self.sales.get(&deed).map_or(SaleState::None, |r| r.state)
    }

    fn record(&self, deed: DeedKey) -> Result<SaleRecord, SettlementError> {
        self.sales
            .get(&deed)
            .cloned()
            .ok_or(SettlementError::NotFound {
                kind: "sale",
                id: deed.id,
            })
    }

    /// List a deed for sale. The caller becomes the seller and must have
    /// approved this contract to move the deed.
    ///
    /// # Errors
    ///
    /// `InvalidPrice` for a zero price, `InvalidWindow` for a zero duration,
    /// `AlreadyListed` if the token already has an active sale.
    pub fn sell_property(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        terms: SaleTerms,
    ) -> Result<(), SettlementError> {
        if terms.price == 0 {
            return Err(SettlementError::InvalidPrice);
        }
        if terms.window_duration == 0 {
            return Err(SettlementError::InvalidWindow);
        }
        let deed = terms.deed();
        if self.state_of(deed).is_active() {
            return Err(SettlementError::AlreadyListed(terms.token_id));
        }
        ledger.payment_token(&terms.payment_token)?;
        let window_end = ctx
            .now
            .checked_add(terms.window_duration)
            .ok_or(SettlementError::AmountOverflow)?;

        let record = SaleRecord {
            token_id: terms.token_id,
            deed_registry: terms.deed_registry,
            seller: ctx.caller,
            buyer: None,
            designated_buyer: None,
            payment_token: terms.payment_token,
            price: terms.price,
            window_start: ctx.now,
            window_end,
            state: SaleState::Listed,
        };

        let custody = self.custody;
        atomically(&mut self.sales, ledger, |sales, ledger| {
            sales.insert(deed, record);
            custody.pull_deed(ledger, ctx, &terms.deed_registry, terms.token_id, ctx.caller)?;
            Ok(())
        })?;

        tracing::info!(
            %deed,
            seller = %ctx.caller,
            price = terms.price,
            window_end,
            "property listed"
        );
        Ok(())
    }

    /// Restrict a listing to one buyer. Seller only, while listed.
    pub fn designate_buyer(
        &mut self,
        ctx: &CallContext,
        deed: DeedKey,
        buyer: Address,
    ) -> Result<(), SettlementError> {
        let record = self.record(deed)?;
        if ctx.caller != record.seller {
            return Err(SettlementError::NotSeller(ctx.caller));
        }
        require_state(record.state, SaleState::Listed)?;

        if let Some(r) = self.sales.get_mut(&deed) {
            r.designated_buyer = Some(buyer);
        }
        tracing::info!(%deed, %buyer, "buyer designated");
        Ok(())
    }

    /// Buy a listed property.
    ///
    /// `signature` must be the caller's signature over the agreement hash
    /// for `(token id, caller, deed agreement text)`. The caller must have
    /// approved this contract for the price.
    pub fn buy_property(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        deed: DeedKey,
        signature: &ParcelSignature,
    ) -> Result<(), SettlementError> {
        let record = self.record(deed)?;
        let text = ledger.deeds(&deed.registry)?.agreement_text(deed.id)?;
        require_consent(signature, deed.id, &ctx.caller, text)?;
        if let Some(designated) = record.designated_buyer {
            if designated != ctx.caller {
                return Err(SettlementError::NotDesignatedBuyer(ctx.caller));
            }
        }
        require_state(record.state, SaleState::Listed)?;
        require_open(ctx.now, record.window_end)?;

        let custody = self.custody;
        atomically(&mut self.sales, ledger, |sales, ledger| {
            let r = active_record(sales, deed)?;
            r.buyer = Some(ctx.caller);
            r.state = SaleState::PurchasePending;
            custody.pull_funds(ledger, ctx, &record.payment_token, ctx.caller, record.price)?;
            Ok(())
        })?;

        tracing::info!(%deed, buyer = %ctx.caller, amount = record.price, "purchase deposited");
        Ok(())
    }

    /// Settle a pending purchase. Seller only, before the window closes.
    ///
    /// Pays the fee, pays off the deed's lien (reserve first, then
    /// proceeds), pays the seller the remainder and hands the deed to the
    /// buyer. Fails with `InsufficientFundsForLien` (before anything moves)
    /// if the price cannot cover the fee plus whatever the reserve leaves
    /// owing.
    pub fn execute(
        &mut self,
        ledger: &mut Ledger,
        liens: &mut LienBook,
        ctx: &CallContext,
        deed: DeedKey,
    ) -> Result<SettlementReceipt, SettlementError> {
        let record = self.record(deed)?;
        if ctx.caller != record.seller {
            return Err(SettlementError::NotSeller(ctx.caller));
        }
        require_state(record.state, SaleState::PurchasePending)?;
        require_open(ctx.now, record.window_end)?;
        let buyer = record.buyer.ok_or_else(|| SettlementError::InvalidState {
            current: "PurchasePending without buyer".into(),
            expected: SaleState::PurchasePending.to_string(),
        })?;

        let token = record.payment_token;
        let registry = ledger.deeds(&deed.registry)?;
        let lien = registry.lien_of(deed.id)?;
        let (lien_balance, from_reserve) = match lien {
            Some(address) => {
                let l = liens.lien(&address)?;
                if l.payment_token != token {
                    return Err(SettlementError::LienTokenMismatch {
                        lien_token: l.payment_token,
                        sale_token: token,
                    });
                }
                let owed = l.balance_view(ctx.now);
                (owed, registry.reserve_of(deed.id, &token).min(owed))
            }
            None => (0, 0),
        };
        let split = FeeSplit::compute(
            record.price,
            lien_balance - from_reserve,
            self.config.fee_divisor,
        )?;

        let custody = self.custody;
        let admin = self.config.admin;
        rollback_on_error(liens, |liens| {
            atomically(&mut self.sales, ledger, |sales, ledger| {
                sales.remove(&deed);

                custody.release_funds(ledger, ctx, &token, admin, split.fee)?;
                custody.release_funds(ledger, ctx, &token, record.seller, split.seller_proceeds)?;

                if let Some(lien_address) = lien {
                    let as_holder = ctx.as_contract(custody.holder());
                    let drawn =
                        ledger.draw_reserve(&as_holder, deed, &token, custody.holder(), from_reserve)?;
                    let payoff = split
                        .lien_payoff
                        .checked_add(drawn)
                        .ok_or(SettlementError::AmountOverflow)?;
                    if payoff > 0 {
                        custody.approve_funds(ledger, ctx, &token, lien_address, payoff)?;
                        let paid = liens.pay(ledger, &as_holder, lien_address, payoff)?;
                        tracing::debug!(%deed, lien = %lien_address, paid, from_reserve = drawn, "lien paid");
                    }
                    let remaining = liens.balance_view(&lien_address, ctx.now)?;
                    if remaining > 0 {
                        tracing::warn!(%deed, lien = %lien_address, remaining, "lien unsatisfied, aborting");
                        return Err(SettlementError::LienUnsatisfied { remaining });
                    }
                }

                custody.release_deed(ledger, ctx, &deed.registry, deed.id, buyer)?;
                Ok(())
            })
        })?;

        let receipt = SettlementReceipt::new(
            SettlementKind::Sale,
            deed.id,
            record.seller,
            Some(buyer),
            token,
            admin,
            split,
            ctx.now,
        );
        tracing::info!(
            %deed,
            seller = %record.seller,
            buyer = %buyer,
            amount = split.gross,
            fee = split.fee,
            lien_payoff = split.lien_payoff,
            reserve_payoff = from_reserve,
            receipt = %receipt.receipt_id,
            "sale executed"
        );
        Ok(receipt)
    }

    /// Seller unwinds after the window closes, whether or not a buyer paid.
    ///
    /// The deed returns to the seller, any deposit returns to the buyer, and
    /// the record is cleared.
    pub fn revert_seller(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        deed: DeedKey,
    ) -> Result<(), SettlementError> {
        let record = self.record(deed)?;
        if ctx.caller != record.seller {
            return Err(SettlementError::NotSeller(ctx.caller));
        }
        if !record.state.is_active() {
            return Err(SettlementError::InvalidState {
                current: record.state.to_string(),
                expected: "Listed or PurchasePending".into(),
            });
        }
        require_closed(ctx.now, record.window_end)?;

        let custody = self.custody;
        atomically(&mut self.sales, ledger, |sales, ledger| {
            sales.remove(&deed);
            if let Some(buyer) = record.buyer {
                custody.release_funds(ledger, ctx, &record.payment_token, buyer, record.price)?;
            }
            custody.release_deed(ledger, ctx, &deed.registry, deed.id, record.seller)?;
            Ok(())
        })?;

        tracing::info!(%deed, seller = %record.seller, refunded = ?record.buyer, "sale reverted by seller");
        Ok(())
    }

    /// Buyer unwinds after the window closes.
    ///
    /// The buyer is refunded, the deed returns to the seller, and the record
    /// stays behind as `Cancelled`.
    pub fn revert_buyer(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        deed: DeedKey,
    ) -> Result<(), SettlementError> {
        let record = self.record(deed)?;
        if record.buyer != Some(ctx.caller) {
            return Err(SettlementError::NotBuyer(ctx.caller));
        }
        require_state(record.state, SaleState::PurchasePending)?;
        require_closed(ctx.now, record.window_end)?;

        let custody = self.custody;
        atomically(&mut self.sales, ledger, |sales, ledger| {
            active_record(sales, deed)?.state = SaleState::Cancelled;
            custody.release_funds(ledger, ctx, &record.payment_token, ctx.caller, record.price)?;
            custody.release_deed(ledger, ctx, &deed.registry, deed.id, record.seller)?;
            Ok(())
        })?;

        tracing::info!(%deed, buyer = %ctx.caller, amount = record.price, "sale reverted by buyer");
        Ok(())
    }
}

fn require_state(current: SaleState, expected: SaleState) -> Result<(), SettlementError> {
    if current != expected {
        return Err(SettlementError::InvalidState {
            current: current.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

fn active_record(
    sales: &mut BTreeMap<DeedKey, SaleRecord>,
    deed: DeedKey,
) -> Result<&mut SaleRecord, SettlementError> {
    sales.get_mut(&deed).ok_or(SettlementError::NotFound {
        kind: "sale",
        id: deed.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn contract(ledger: &mut Ledger) -> SalesContract {
        SalesContract::deploy(ledger, PlatformConfig::new(addr(0xAD))).unwrap()
    }

    fn terms(price: u64, window_duration: u64) -> SaleTerms {
        SaleTerms {
            deed_registry: addr(0xDD),
            token_id: 1,
            payment_token: addr(0xEE),
            price,
            window_duration,
        }
    }

    #[test]
    fn rejects_zero_price_and_window() {
        let mut ledger = Ledger::new(100);
        let mut escrow = contract(&mut ledger);
        let ctx = ledger.context(addr(1));

        assert!(matches!(
            escrow.sell_property(&mut ledger, &ctx, terms(0, 10)),
            Err(SettlementError::InvalidPrice)
        ));
        assert!(matches!(
            escrow.sell_property(&mut ledger, &ctx, terms(10, 0)),
            Err(SettlementError::InvalidWindow)
        ));
    }

    #[test]
    fn absent_record_reads_as_none() {
        let mut ledger = Ledger::new(100);
        let escrow = contract(&mut ledger);
        let deed = DeedKey::new(addr(0xDD), 42);
        assert_eq!(escrow.state_of(deed), SaleState::None);
        assert!(escrow.get_property(deed).is_none());
    }

    #[test]
    fn failed_listing_leaves_no_record() {
        let mut ledger = Ledger::new(100);
        let mut escrow = contract(&mut ledger);
        let token = ledger.deploy_payment_token(addr(1), "Dollar", "USD");
        let registry = ledger.deploy_deed_registry(addr(1), "Deeds");
        let ctx = ledger.context(addr(1));

        // Deed 1 was never minted, so the custody pull fails after the insert.
        let result = escrow.sell_property(
            &mut ledger,
            &ctx,
            SaleTerms {
                deed_registry: registry,
                token_id: 1,
                payment_token: token,
                price: 10,
                window_duration: 10,
            },
        );
        assert!(result.is_err());
        assert_eq!(escrow.state_of(DeedKey::new(registry, 1)), SaleState::None);
    }

    #[test]
    fn zero_fee_divisor_is_rejected_at_deploy() {
        let mut ledger = Ledger::new(0);
        let config = PlatformConfig {
            admin: addr(1),
            fee_divisor: 0,
        };
        assert!(matches!(
            SalesContract::deploy(&mut ledger, config),
            Err(SettlementError::Config(_))
        ));
    }
}
