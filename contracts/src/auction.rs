//! # Auction Contract
//!
//! English auction for a single deed, addressed by its [`DeedKey`].
//!
//! The seller puts the deed in custody with a start price, an optional
//! buy-now price (`max_price`, 0 disables it) and a deadline. Each bid must
//! strictly beat the current leader; the bidder's full amount goes into
//! custody and the previous leader is refunded on the spot, so at any moment
//! only the leader's deposit is held.
//!
//! Bidding stops at the deadline, or as soon as a bid reaches the buy-now
//! price. The seller then closes: the winner gets the deed, the seller gets
//! the bid minus the platform fee. An auction nobody bid on just returns the
//! deed.

use parcel_protocol::config::PlatformConfig;
use parcel_protocol::crypto::ParcelSignature;
use parcel_protocol::ledger::{Address, CallContext, DeedId, DeedKey, Ledger, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::consent::require_consent;
use crate::custody::{atomically, Custody};
use crate::error::{require_open, SettlementError};
use crate::fees::{FeeSplit, SettlementKind, SettlementReceipt};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    Open,
    Closed,
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuctionStatus::Open => write!(f, "Open"),
            AuctionStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// Parameters a seller chooses when opening an auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionTerms {
    pub deed_registry: Address,
    pub token_id: DeedId,
    pub payment_token: Address,
    pub start_price: u64,
    /// Buy-now threshold. 0 means no buy-now.
    pub max_price: u64,
    /// Seconds from creation until the deadline.
    pub duration: u64,
}

impl AuctionTerms {
    pub fn deed(&self) -> DeedKey {
        DeedKey::new(self.deed_registry, self.token_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRecord {
    pub token_id: DeedId,
    pub deed_registry: Address,
    pub seller: Address,
    pub start_price: u64,
    pub max_price: u64,
    pub payment_token: Address,
    pub deadline: Timestamp,
    pub leader: Option<Address>,
    pub leader_bid: u64,
    pub bid_count: u64,
    pub status: AuctionStatus,
}

impl AuctionRecord {
    pub fn deed(&self) -> DeedKey {
        DeedKey::new(self.deed_registry, self.token_id)
    }

    /// A bid has reached the buy-now price.
    pub fn buy_now_reached(&self) -> bool {
        self.max_price > 0 && self.leader.is_some() && self.leader_bid >= self.max_price
    }

    /// Smallest bid that would be accepted right now.
    pub fn minimum_bid(&self) -> u64 {
        match self.leader {
            Some(_) => self.leader_bid.saturating_add(1),
            None => self.start_price,
        }
    }
}

/// Auction records plus every bidder's escrowed deposit.
#[derive(Debug, Clone, Default)]
struct AuctionBook {
    auctions: BTreeMap<DeedKey, AuctionRecord>,
    deposits: BTreeMap<(DeedKey, Address), u64>,
}

impl AuctionBook {
    fn record_mut(&mut self, deed: DeedKey) -> Result<&mut AuctionRecord, SettlementError> {
        self.auctions
            .get_mut(&deed)
            .ok_or(SettlementError::NotFound {
                kind: "auction",
                id: deed.id,
            })
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuctionContract {
    custody: Custody,
    config: PlatformConfig,
    book: AuctionBook,
}

impl AuctionContract {
    pub fn deploy(ledger: &mut Ledger, config: PlatformConfig) -> Result<Self, SettlementError> {
        config.validate()?;
        let address = ledger.allocate_address("auction");
        tracing::info!(%address, admin = %config.admin, "auction contract deployed");
        Ok(Self {
            custody: Custody::new(address),
            config,
            book: AuctionBook::default(),
        })
    }

    pub fn address(&self) -> Address {
        self.custody.holder()
    }

    pub fn get_auction(&self, deed: DeedKey) -> Option<&AuctionRecord> {
        self.book.auctions.get(&deed)
    }

    /// Amount `bidder` currently has escrowed in the auction for `deed`.
    pub fn get_deposit(&self, deed: DeedKey, bidder: &Address) -> u64 {
        self.book
            .deposits
            .get(&(deed, *bidder))
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, deed: DeedKey) -> Result<AuctionRecord, SettlementError> {
        self.book
            .auctions
            .get(&deed)
            .cloned()
            .ok_or(SettlementError::NotFound {
                kind: "auction",
                id: deed.id,
            })
    }

    /// Open an auction. The caller becomes the seller and must have approved
    /// this contract to move the deed.
    pub fn create_auction(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        terms: AuctionTerms,
    ) -> Result<(), SettlementError> {
        if terms.start_price == 0 || (terms.max_price > 0 && terms.max_price < terms.start_price) {
            return Err(SettlementError::InvalidPrice);
        }
        if terms.duration == 0 {
            return Err(SettlementError::InvalidWindow);
        }
        let deed = terms.deed();
        if let Some(existing) = self.book.auctions.get(&deed) {
            if existing.status == AuctionStatus::Open {
                return Err(SettlementError::AlreadyListed(terms.token_id));
            }
        }
        ledger.payment_token(&terms.payment_token)?;
        let deadline = ctx
            .now
            .checked_add(terms.duration)
            .ok_or(SettlementError::AmountOverflow)?;

        let record = AuctionRecord {
            token_id: terms.token_id,
            deed_registry: terms.deed_registry,
            seller: ctx.caller,
            start_price: terms.start_price,
            max_price: terms.max_price,
            payment_token: terms.payment_token,
            deadline,
            leader: None,
            leader_bid: 0,
            bid_count: 0,
            status: AuctionStatus::Open,
        };

        let custody = self.custody;
        atomically(&mut self.book, ledger, |book, ledger| {
            book.auctions.insert(deed, record);
            custody.pull_deed(ledger, ctx, &terms.deed_registry, terms.token_id, ctx.caller)?;
            Ok(())
        })?;

        tracing::info!(
            %deed,
            seller = %ctx.caller,
            start_price = terms.start_price,
            max_price = terms.max_price,
            deadline,
            "auction created"
        );
        Ok(())
    }

    /// Place a bid of `amount`.
    ///
    /// `signature` is the bidder's agreement signature for the deed's token id.
    /// The bidder must have approved this contract for `amount`; the previous
    /// leader's deposit is refunded in full.
    pub fn bid(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        deed: DeedKey,
        amount: u64,
        signature: &ParcelSignature,
    ) -> Result<(), SettlementError> {
        let record = self.record(deed)?;
        let text = ledger.deeds(&deed.registry)?.agreement_text(deed.id)?;
        require_consent(signature, deed.id, &ctx.caller, text)?;
        if ctx.caller == record.seller {
            return Err(SettlementError::SellerCannotBid);
        }
        if record.status != AuctionStatus::Open || record.buy_now_reached() {
            return Err(SettlementError::AuctionClosed);
        }
        require_open(ctx.now, record.deadline)?;
        let minimum = record.minimum_bid();
        if amount < minimum {
            return Err(SettlementError::BidTooLow {
                bid: amount,
                minimum,
            });
        }

        let custody = self.custody;
        let token = record.payment_token;
        atomically(&mut self.book, ledger, |book, ledger| {
            let r = book.record_mut(deed)?;
            let previous = r.leader.replace(ctx.caller).map(|p| (p, r.leader_bid));
            r.leader_bid = amount;
            r.bid_count = r.bid_count.checked_add(1).ok_or(SettlementError::AmountOverflow)?;

            custody.pull_funds(ledger, ctx, &token, ctx.caller, amount)?;
            if let Some((prev_leader, prev_bid)) = previous {
                book.deposits.remove(&(deed, prev_leader));
                custody.release_funds(ledger, ctx, &token, prev_leader, prev_bid)?;
                tracing::debug!(%deed, bidder = %prev_leader, amount = prev_bid, "outbid leader refunded");
            }
            let deposit = book.deposits.entry((deed, ctx.caller)).or_insert(0);
            *deposit = deposit
                .checked_add(amount)
                .ok_or(SettlementError::AmountOverflow)?;
            Ok(())
        })?;

        tracing::info!(%deed, bidder = %ctx.caller, amount, "bid accepted");
        Ok(())
    }

    /// Reclaim the caller's deposit. Returns the amount refunded, possibly 0.
    pub fn withdraw_from_auction(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        deed: DeedKey,
    ) -> Result<u64, SettlementError> {
        let record = self.record(deed)?;
        if record.leader == Some(ctx.caller) {
            return Err(SettlementError::LeaderCannotWithdraw);
        }
        let amount = self.get_deposit(deed, &ctx.caller);
        if amount == 0 {
            return Ok(0);
        }

        let custody = self.custody;
        atomically(&mut self.book, ledger, |book, ledger| {
            book.deposits.remove(&(deed, ctx.caller));
            custody.release_funds(ledger, ctx, &record.payment_token, ctx.caller, amount)?;
            Ok(())
        })?;

        tracing::info!(%deed, bidder = %ctx.caller, amount, "deposit withdrawn");
        Ok(amount)
    }

    /// Close the auction. Seller only, after the deadline or once buy-now
    /// has been reached.
    ///
    /// Returns the settlement receipt, or `None` if nobody bid and the deed
    /// simply went back to the seller.
    pub fn close(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        deed: DeedKey,
    ) -> Result<Option<SettlementReceipt>, SettlementError> {
        let record = self.record(deed)?;
        if ctx.caller != record.seller {
            return Err(SettlementError::NotSeller(ctx.caller));
        }
        if record.status != AuctionStatus::Open {
            return Err(SettlementError::InvalidState {
                current: record.status.to_string(),
                expected: AuctionStatus::Open.to_string(),
            });
        }
        if ctx.now < record.deadline && !record.buy_now_reached() {
            return Err(SettlementError::WindowStillOpen {
                now: ctx.now,
                window_end: record.deadline,
            });
        }

        let custody = self.custody;
        let admin = self.config.admin;
        let token = record.payment_token;

        let Some(winner) = record.leader else {
            atomically(&mut self.book, ledger, |book, ledger| {
                book.record_mut(deed)?.status = AuctionStatus::Closed;
                custody.release_deed(ledger, ctx, &deed.registry, deed.id, record.seller)?;
                Ok(())
            })?;
            tracing::info!(%deed, seller = %record.seller, "auction closed without bids");
            return Ok(None);
        };

        let split = FeeSplit::compute(record.leader_bid, 0, self.config.fee_divisor)?;
        atomically(&mut self.book, ledger, |book, ledger| {
            book.record_mut(deed)?.status = AuctionStatus::Closed;
            book.deposits.remove(&(deed, winner));
            custody.release_funds(ledger, ctx, &token, admin, split.fee)?;
            custody.release_funds(ledger, ctx, &token, record.seller, split.seller_proceeds)?;
            custody.release_deed(ledger, ctx, &deed.registry, deed.id, winner)?;
            Ok(())
        })?;

        let receipt = SettlementReceipt::new(
            SettlementKind::Auction,
            deed.id,
            record.seller,
            Some(winner),
            token,
            admin,
            split,
            ctx.now,
        );
        tracing::info!(
            %deed,
            seller = %record.seller,
            winner = %winner,
            amount = split.gross,
            fee = split.fee,
            bids = record.bid_count,
            receipt = %receipt.receipt_id,
            "auction closed"
        );
        Ok(Some(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn terms(start_price: u64, max_price: u64, duration: u64) -> AuctionTerms {
        AuctionTerms {
            deed_registry: addr(0xDD),
            token_id: 1,
            payment_token: addr(0xEE),
            start_price,
            max_price,
            duration,
        }
    }

    #[test]
    fn price_and_duration_validation() {
        let mut ledger = Ledger::new(0);
        let mut auction = AuctionContract::deploy(&mut ledger, PlatformConfig::new(addr(9))).unwrap();
        let ctx = ledger.context(addr(1));

        for bad in [terms(0, 0, 10), terms(100, 50, 10)] {
            assert!(matches!(
                auction.create_auction(&mut ledger, &ctx, bad),
                Err(SettlementError::InvalidPrice)
            ));
        }
        assert!(matches!(
            auction.create_auction(&mut ledger, &ctx, terms(100, 0, 0)),
            Err(SettlementError::InvalidWindow)
        ));
    }

    #[test]
    fn minimum_bid_tracks_leader() {
        let mut record = AuctionRecord {
            token_id: 1,
            deed_registry: addr(0xDD),
            seller: addr(1),
            start_price: 200,
            max_price: 500,
            payment_token: addr(0xEE),
            deadline: 100,
            leader: None,
            leader_bid: 0,
            bid_count: 0,
            status: AuctionStatus::Open,
        };
        assert_eq!(record.minimum_bid(), 200);
        assert!(!record.buy_now_reached());

        record.leader = Some(addr(2));
        record.leader_bid = 200;
        assert_eq!(record.minimum_bid(), 201);

        record.leader_bid = 500;
        assert!(record.buy_now_reached());

        record.max_price = 0;
        assert!(!record.buy_now_reached());
    }
}
