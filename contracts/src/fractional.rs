//! # Fractional Token Factory
//!
//! Pooled purchase of a property by many KYC-verified buyers.
//!
//! A listing offers `total_units` at `price_per_unit` until `window_end`.
//! Buyers sign the listing's agreement text and pay for units; their payment
//! sits in the factory's custody. Nothing is minted until the listing is
//! fully subscribed:
//!
//! - **Fully sold**: anyone may `execute`. A [`ShareClass`] is minted for the
//!   listing, each buyer's units become share balances, and the seller is
//!   paid the proceeds minus the platform fee.
//! - **Not fully sold by the deadline**: each buyer may `revert` to get their
//!   payment back.
//!
//! Shares never move by themselves. [`ShareClass::transfer`] only accepts
//! the factory as caller, and the factory only moves shares through
//! [`TokenFactory::transfer_shares`], which requires the recipient to be
//! KYC-authorized.

use parcel_protocol::config::{PlatformConfig, MAX_AGREEMENT_TEXT_LEN};
use parcel_protocol::crypto::ParcelSignature;
use parcel_protocol::ledger::{Address, CallContext, Ledger, LedgerError, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::consent::require_consent;
use crate::custody::{atomically, Custody};
use crate::error::{require_closed, require_open, SettlementError};
use crate::fees::{FeeSplit, SettlementKind, SettlementReceipt};

/// Listing identifier. Starts at 1, never reused.
pub type ListingId = u64;

// ---------------------------------------------------------------------------
// Share class
// ---------------------------------------------------------------------------

/// Fractional ownership token minted for one executed listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareClass {
    pub address: Address,
    pub listing_id: ListingId,
    pub name: String,
    pub symbol: String,
    factory: Address,
    total_supply: u64,
    balances: BTreeMap<Address, u64>,
}

impl ShareClass {
    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Move shares from `from` to `to`.
    ///
    /// Restricted: only the factory may call this.
    pub fn transfer(
        &mut self,
        ctx: &CallContext,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<(), SettlementError> {
        if ctx.caller != self.factory {
            return Err(SettlementError::TransferRestricted);
        }
        let available = self.balance_of(&from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                available,
                requested: amount,
            }
            .into());
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let credited = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(SettlementError::AmountOverflow)?;
        if available == amount {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, available - amount);
        }
        self.balances.insert(to, credited);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    Open,
    Executed,
    Cancelled,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingStatus::Open => write!(f, "Open"),
            ListingStatus::Executed => write!(f, "Executed"),
            ListingStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// What gets offered when a property is listed for fractional sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingTerms {
    pub seller: Address,
    pub payment_token: Address,
    pub total_units: u64,
    pub price_per_unit: u64,
    /// Seconds from listing until the purchase window closes.
    pub window_duration: u64,
    pub agreement_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FractionalListing {
    pub id: ListingId,
    pub seller: Address,
    pub payment_token: Address,
    pub total_units: u64,
    pub price_per_unit: u64,
    pub window_end: Timestamp,
    pub units_sold: BTreeMap<Address, u64>,
    pub total_sold: u64,
    pub agreement_text: String,
    pub status: ListingStatus,
    /// Set once executed.
    pub share_class: Option<Address>,
}

impl FractionalListing {
    pub fn units_of(&self, buyer: &Address) -> u64 {
        self.units_sold.get(buyer).copied().unwrap_or(0)
    }

    pub fn available_units(&self) -> u64 {
        self.total_units - self.total_sold
    }
}

#[derive(Debug, Clone)]
struct FactoryBook {
    next_id: ListingId,
    listings: BTreeMap<ListingId, FractionalListing>,
    share_classes: BTreeMap<ListingId, ShareClass>,
}

impl FactoryBook {
    fn listing_mut(&mut self, id: ListingId) -> Result<&mut FractionalListing, SettlementError> {
        self.listings
            .get_mut(&id)
            .ok_or(SettlementError::NotFound { kind: "listing", id })
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TokenFactory {
    custody: Custody,
    config: PlatformConfig,
    kyc_registry: Address,
    book: FactoryBook,
}

impl TokenFactory {
    /// Deploy a factory gated by the KYC registry at `kyc_registry`.
    pub fn deploy(
        ledger: &mut Ledger,
        config: PlatformConfig,
        kyc_registry: Address,
    ) -> Result<Self, SettlementError> {
        config.validate()?;
        ledger.kyc(&kyc_registry)?;
        let address = ledger.allocate_address("token-factory");
        tracing::info!(%address, admin = %config.admin, kyc = %kyc_registry, "token factory deployed");
        Ok(Self {
            custody: Custody::new(address),
            config,
            kyc_registry,
            book: FactoryBook {
                next_id: 1,
                listings: BTreeMap::new(),
                share_classes: BTreeMap::new(),
            },
        })
    }

    pub fn address(&self) -> Address {
        self.custody.holder()
    }

    pub fn get_listing(&self, id: ListingId) -> Option<&FractionalListing> {
        self.book.listings.get(&id)
    }

    /// Units `buyer` has paid for on listing `id`.
    pub fn units_of(&self, id: ListingId, buyer: &Address) -> u64 {
        self.book
            .listings
            .get(&id)
            .map_or(0, |l| l.units_of(buyer))
    }

    /// Address of the share class minted for listing `id`, once executed.
    pub fn contract_of(&self, id: ListingId) -> Option<Address> {
        self.book.share_classes.get(&id).map(|s| s.address)
    }

    pub fn shares_of(&self, id: ListingId, holder: &Address) -> u64 {
        self.book
            .share_classes
            .get(&id)
            .map_or(0, |s| s.balance_of(holder))
    }

    pub fn share_class(&self, id: ListingId) -> Option<&ShareClass> {
        self.book.share_classes.get(&id)
    }

    pub fn share_class_mut(&mut self, id: ListingId) -> Option<&mut ShareClass> {
        self.book.share_classes.get_mut(&id)
    }

    fn listing(&self, id: ListingId) -> Result<FractionalListing, SettlementError> {
        self.book
            .listings
            .get(&id)
            .cloned()
            .ok_or(SettlementError::NotFound { kind: "listing", id })
    }

    fn require_manager(&self, ctx: &CallContext, seller: &Address) -> Result<(), SettlementError> {
        if ctx.caller != self.config.admin && ctx.caller != *seller {
            return Err(SettlementError::NotListingManager(ctx.caller));
        }
        Ok(())
    }

    fn require_kyc(&self, ledger: &Ledger, account: &Address) -> Result<(), SettlementError> {
        if !ledger.kyc(&self.kyc_registry)?.is_authorized(account) {
            return Err(SettlementError::AccessDenied(*account));
        }
        Ok(())
    }

    /// Open a fractional listing. Platform admin or the named seller only.
    pub fn list_property(
        &mut self,
        ledger: &Ledger,
        ctx: &CallContext,
        terms: ListingTerms,
    ) -> Result<ListingId, SettlementError> {
        self.require_manager(ctx, &terms.seller)?;
        if terms.total_units == 0 || terms.price_per_unit == 0 {
            return Err(SettlementError::InvalidPrice);
        }
        terms
            .total_units
            .checked_mul(terms.price_per_unit)
            .ok_or(SettlementError::AmountOverflow)?;
        if terms.window_duration == 0 {
            return Err(SettlementError::InvalidWindow);
        }
        if terms.agreement_text.len() > MAX_AGREEMENT_TEXT_LEN {
            return Err(LedgerError::AgreementTooLong {
                len: terms.agreement_text.len(),
                max: MAX_AGREEMENT_TEXT_LEN,
            }
            .into());
        }
        ledger.payment_token(&terms.payment_token)?;
        let window_end = ctx
            .now
            .checked_add(terms.window_duration)
            .ok_or(SettlementError::AmountOverflow)?;

        let id = self.book.next_id;
        self.book.next_id = id.checked_add(1).ok_or(SettlementError::AmountOverflow)?;
        self.book.listings.insert(
            id,
            FractionalListing {
                id,
                seller: terms.seller,
                payment_token: terms.payment_token,
                total_units: terms.total_units,
                price_per_unit: terms.price_per_unit,
                window_end,
                units_sold: BTreeMap::new(),
                total_sold: 0,
                agreement_text: terms.agreement_text,
                status: ListingStatus::Open,
                share_class: None,
            },
        );

        tracing::info!(
            listing = id,
            seller = %terms.seller,
            units = terms.total_units,
            price_per_unit = terms.price_per_unit,
            window_end,
            "fractional listing opened"
        );
        Ok(id)
    }

    /// Buy `units` of listing `id`.
    ///
    /// Requires the caller's agreement signature for this listing and a KYC
    /// credential at call time. The caller must have approved the factory
    /// for `units * price_per_unit`.
    pub fn buy_token(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        id: ListingId,
        units: u64,
        signature: &ParcelSignature,
    ) -> Result<(), SettlementError> {
        let listing = self.listing(id)?;
        require_consent(signature, id, &ctx.caller, &listing.agreement_text)?;
        self.require_kyc(ledger, &ctx.caller)?;
        if units == 0 {
            return Err(SettlementError::InvalidPrice);
        }
        let available = listing.available_units();
        if units > available {
            return Err(SettlementError::ExceedsAvailableUnits {
                requested: units,
                available,
            });
        }
        require_listing_status(listing.status, ListingStatus::Open)?;
        require_open(ctx.now, listing.window_end)?;
        let cost = units
            .checked_mul(listing.price_per_unit)
            .ok_or(SettlementError::AmountOverflow)?;

        let custody = self.custody;
        atomically(&mut self.book, ledger, |book, ledger| {
            let l = book.listing_mut(id)?;
            let held = l.units_sold.entry(ctx.caller).or_insert(0);
            *held = held.checked_add(units).ok_or(SettlementError::AmountOverflow)?;
            l.total_sold = l
                .total_sold
                .checked_add(units)
                .ok_or(SettlementError::AmountOverflow)?;
            custody.pull_funds(ledger, ctx, &listing.payment_token, ctx.caller, cost)?;
            Ok(())
        })?;

        tracing::info!(listing = id, buyer = %ctx.caller, units, cost, "fractional units purchased");
        Ok(())
    }

    /// Mint the share class for a fully subscribed listing and pay the
    /// seller. Anyone may call.
    pub fn execute(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        id: ListingId,
        name: &str,
        symbol: &str,
    ) -> Result<SettlementReceipt, SettlementError> {
        let listing = self.listing(id)?;
        require_listing_status(listing.status, ListingStatus::Open)?;
        if listing.total_sold != listing.total_units {
            return Err(SettlementError::NotAllTokensPurchased {
                sold: listing.total_sold,
                total: listing.total_units,
            });
        }
        let gross = listing
            .total_units
            .checked_mul(listing.price_per_unit)
            .ok_or(SettlementError::AmountOverflow)?;
        let split = FeeSplit::compute(gross, 0, self.config.fee_divisor)?;

        let custody = self.custody;
        let admin = self.config.admin;
        let token = listing.payment_token;
        let share_address = atomically(&mut self.book, ledger, |book, ledger| {
            let share_address = ledger.allocate_address("share-class");
            let l = book.listing_mut(id)?;
            l.status = ListingStatus::Executed;
            l.share_class = Some(share_address);
            book.share_classes.insert(
                id,
                ShareClass {
                    address: share_address,
                    listing_id: id,
                    name: name.to_string(),
                    symbol: symbol.to_string(),
                    factory: custody.holder(),
                    total_supply: listing.total_units,
                    balances: listing.units_sold.clone(),
                },
            );
            custody.release_funds(ledger, ctx, &token, admin, split.fee)?;
            custody.release_funds(ledger, ctx, &token, listing.seller, split.seller_proceeds)?;
            Ok(share_address)
        })?;

        let receipt = SettlementReceipt::new(
            SettlementKind::Fractional,
            id,
            listing.seller,
            None,
            token,
            admin,
            split,
            ctx.now,
        );
        tracing::info!(
            listing = id,
            share_class = %share_address,
            symbol,
            holders = listing.units_sold.len(),
            amount = split.gross,
            fee = split.fee,
            receipt = %receipt.receipt_id,
            "fractional listing executed"
        );
        Ok(receipt)
    }

    /// Refund the caller's purchase on a listing that did not fill in time.
    /// Returns the amount refunded.
    pub fn revert(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        id: ListingId,
    ) -> Result<u64, SettlementError> {
        let listing = self.listing(id)?;
        require_listing_status(listing.status, ListingStatus::Open)?;
        require_closed(ctx.now, listing.window_end)?;
        let units = listing.units_of(&ctx.caller);
        if units == 0 {
            return Err(SettlementError::NoTokensPurchased(ctx.caller));
        }
        let refund = units
            .checked_mul(listing.price_per_unit)
            .ok_or(SettlementError::AmountOverflow)?;

        let custody = self.custody;
        atomically(&mut self.book, ledger, |book, ledger| {
            let l = book.listing_mut(id)?;
            l.units_sold.remove(&ctx.caller);
            l.total_sold = l
                .total_sold
                .checked_sub(units)
                .ok_or(SettlementError::AmountOverflow)?;
            custody.release_funds(ledger, ctx, &listing.payment_token, ctx.caller, refund)?;
            Ok(())
        })?;

        tracing::info!(listing = id, buyer = %ctx.caller, units, refund, "fractional purchase reverted");
        Ok(refund)
    }

    /// Withdraw a listing nobody has bought into. Admin or seller only.
    pub fn cancel_listing(&mut self, ctx: &CallContext, id: ListingId) -> Result<(), SettlementError> {
        let listing = self.listing(id)?;
        self.require_manager(ctx, &listing.seller)?;
        require_listing_status(listing.status, ListingStatus::Open)?;
        if listing.total_sold > 0 {
            return Err(SettlementError::InvalidState {
                current: format!("Open with {} units sold", listing.total_sold),
                expected: "Open with no units sold".into(),
            });
        }
        self.book.listing_mut(id)?.status = ListingStatus::Cancelled;
        tracing::info!(listing = id, by = %ctx.caller, "fractional listing cancelled");
        Ok(())
    }

    /// Move the caller's shares in listing `id` to `to`, who must hold a KYC
    /// credential.
    pub fn transfer_shares(
        &mut self,
        ledger: &Ledger,
        ctx: &CallContext,
        id: ListingId,
        to: Address,
        amount: u64,
    ) -> Result<(), SettlementError> {
        self.require_kyc(ledger, &to)?;
        let factory = ctx.as_contract(self.custody.holder());
        let shares = self
            .book
            .share_classes
            .get_mut(&id)
            .ok_or(SettlementError::NotFound {
                kind: "share class",
                id,
            })?;
        shares.transfer(&factory, ctx.caller, to, amount)?;
        tracing::info!(listing = id, from = %ctx.caller, %to, amount, "shares transferred");
        Ok(())
    }
}

fn require_listing_status(current: ListingStatus, expected: ListingStatus) -> Result<(), SettlementError> {
    if current != expected {
        return Err(SettlementError::InvalidState {
            current: current.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}
