//! Integration tests for the fractional token factory: KYC-gated pooled
//! purchases, execution into a share class, refunds and restricted share
//! transfers.

mod common;

use common::*;
use parcel_contracts::fractional::{ListingId, ListingStatus, ListingTerms, TokenFactory};
use parcel_contracts::{ErrorCategory, SettlementError, SettlementKind, SettlementReceipt};
use parcel_protocol::crypto::ParcelKeypair;
use parcel_protocol::ledger::Address;

const WINDOW: u64 = 7 * 24 * 3600;
const UNITS: u64 = 10;
const PRICE: u64 = 100;

struct Pool {
    world: World,
    factory: TokenFactory,
    id: ListingId,
}

fn terms(token: Address, total_units: u64) -> ListingTerms {
    ListingTerms {
        seller: seller().address(),
        payment_token: token,
        total_units,
        price_per_unit: PRICE,
        window_duration: WINDOW,
        agreement_text: AGREEMENT.into(),
    }
}

/// A 10-unit listing at 100 per unit. Bidders 1..=3 are funded and KYC'd.
fn open_pool() -> Pool {
    let mut world = World::new();
    let mut factory = TokenFactory::deploy(&mut world.ledger, platform_config(), world.kyc).unwrap();
    for n in 1..=3 {
        world.fund(&bidder(n), 2_000);
        world.grant_kyc(&bidder(n));
    }
    let ctx = world.ctx(&admin());
    let id = factory
        .list_property(&world.ledger, &ctx, terms(world.token, UNITS))
        .unwrap();
    Pool { world, factory, id }
}

impl Pool {
    fn buy(&mut self, who: &ParcelKeypair, units: u64) -> Result<(), SettlementError> {
        self.world.approve(who, self.factory.address(), units * PRICE);
        let ctx = self.world.ctx(who);
        self.factory
            .buy_token(&mut self.world.ledger, &ctx, self.id, units, &sign(who, self.id))
    }

    fn execute(&mut self) -> Result<SettlementReceipt, SettlementError> {
        let ctx = self.world.ctx(&bidder(1));
        self.factory
            .execute(&mut self.world.ledger, &ctx, self.id, "12 Elm Street", "ELM12")
    }

    fn revert(&mut self, who: &ParcelKeypair) -> Result<u64, SettlementError> {
        let ctx = self.world.ctx(who);
        self.factory.revert(&mut self.world.ledger, &ctx, self.id)
    }

    fn transfer_shares(
        &mut self,
        from: &ParcelKeypair,
        to: &ParcelKeypair,
        amount: u64,
    ) -> Result<(), SettlementError> {
        let ctx = self.world.ctx(from);
        self.factory
            .transfer_shares(&self.world.ledger, &ctx, self.id, to.address(), amount)
    }
}

// ---------------------------------------------------------------------------
// Subscription and execution
// ---------------------------------------------------------------------------

#[test]
fn fully_subscribed_listing_executes_into_shares() {
    let mut p = open_pool();
    p.buy(&bidder(1), 5).unwrap();
    p.buy(&bidder(2), 3).unwrap();
    p.buy(&bidder(3), 2).unwrap();
    assert_eq!(p.world.balance(&p.factory.address()), UNITS * PRICE);
    assert_eq!(p.factory.get_listing(p.id).unwrap().available_units(), 0);

    let receipt = p.execute().unwrap();
    assert_eq!(receipt.kind, SettlementKind::Fractional);
    assert_eq!(receipt.subject, p.id);
    assert_eq!(receipt.buyer, None);
    assert_eq!(receipt.split.fee, 5);

    assert_eq!(p.world.balance(&seller().address()), 995);
    assert_eq!(p.world.balance(&admin().address()), 5);
    assert_eq!(p.world.balance(&p.factory.address()), 0);

    let shares = p.factory.share_class(p.id).unwrap();
    assert_eq!(shares.total_supply(), UNITS);
    assert_eq!(shares.symbol, "ELM12");
    assert_eq!(p.factory.contract_of(p.id), Some(shares.address));
    assert_eq!(p.factory.shares_of(p.id, &bidder(1).address()), 5);
    assert_eq!(p.factory.shares_of(p.id, &bidder(2).address()), 3);
    assert_eq!(p.factory.shares_of(p.id, &bidder(3).address()), 2);

    let listing = p.factory.get_listing(p.id).unwrap();
    assert_eq!(listing.status, ListingStatus::Executed);
    assert_eq!(listing.share_class, Some(shares.address));

    let err = p.execute().unwrap_err();
    assert!(matches!(err, SettlementError::InvalidState { .. }));
}

#[test]
fn repeat_purchases_accumulate() {
    let mut p = open_pool();
    p.buy(&bidder(1), 2).unwrap();
    p.buy(&bidder(1), 3).unwrap();
    assert_eq!(p.factory.units_of(p.id, &bidder(1).address()), 5);
    assert_eq!(p.world.balance(&bidder(1).address()), 2_000 - 500);
}

#[test]
fn partial_subscription_cannot_execute() {
    let mut p = open_pool();
    p.buy(&bidder(1), 4).unwrap();
    let err = p.execute().unwrap_err();
    assert!(matches!(
        err,
        SettlementError::NotAllTokensPurchased { sold: 4, total: UNITS }
    ));
    assert!(p.factory.contract_of(p.id).is_none());
}

#[test]
fn cannot_oversubscribe() {
    let mut p = open_pool();
    p.buy(&bidder(1), 8).unwrap();
    let err = p.buy(&bidder(2), 3).unwrap_err();
    assert!(matches!(
        err,
        SettlementError::ExceedsAvailableUnits { requested: 3, available: 2 }
    ));
    assert_eq!(p.world.balance(&bidder(2).address()), 2_000);
}

#[test]
fn zero_units_rejected() {
    let mut p = open_pool();
    let err = p.buy(&bidder(1), 0).unwrap_err();
    assert!(matches!(err, SettlementError::InvalidPrice));
}

#[test]
fn purchases_stop_at_window_end() {
    let mut p = open_pool();
    p.world.advance(WINDOW - 1);
    p.buy(&bidder(1), 1).unwrap();
    p.world.advance(1);
    let err = p.buy(&bidder(2), 1).unwrap_err();
    assert!(matches!(err, SettlementError::WindowClosed { .. }));
    assert_eq!(err.category(), ErrorCategory::Window);
}

#[test]
fn purchase_requires_own_signature_for_this_listing() {
    let mut p = open_pool();
    p.world.approve(&bidder(2), p.factory.address(), PRICE);
    let ctx = p.world.ctx(&bidder(2));
    let err = p
        .factory
        .buy_token(&mut p.world.ledger, &ctx, p.id, 1, &sign(&bidder(1), p.id))
        .unwrap_err();
    assert!(matches!(err, SettlementError::IncorrectSignature));

    let err = p
        .factory
        .buy_token(&mut p.world.ledger, &ctx, p.id, 1, &sign(&bidder(2), p.id + 1))
        .unwrap_err();
    assert!(matches!(err, SettlementError::IncorrectSignature));
}

#[test]
fn missing_allowance_leaves_no_units() {
    let mut p = open_pool();
    let ctx = p.world.ctx(&bidder(1));
    let err = p
        .factory
        .buy_token(&mut p.world.ledger, &ctx, p.id, 2, &sign(&bidder(1), p.id))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Funds);
    assert_eq!(p.factory.units_of(p.id, &bidder(1).address()), 0);
    assert_eq!(p.factory.get_listing(p.id).unwrap().total_sold, 0);
}

// ---------------------------------------------------------------------------
// KYC
// ---------------------------------------------------------------------------

#[test]
fn kyc_is_checked_at_purchase_time() {
    let mut p = open_pool();
    let newcomer = account(0xC1);
    p.world.fund(&newcomer, 1_000);

    let err = p.buy(&newcomer, 1).unwrap_err();
    assert!(matches!(err, SettlementError::AccessDenied(a) if a == newcomer.address()));
    assert_eq!(err.category(), ErrorCategory::Authorization);

    p.world.grant_kyc(&newcomer);
    p.buy(&newcomer, 1).unwrap();

    p.world.revoke_kyc(&newcomer);
    p.world.grant_kyc(&newcomer);
    p.world.revoke_kyc(&newcomer);
    let err = p.buy(&newcomer, 1).unwrap_err();
    assert!(matches!(err, SettlementError::AccessDenied(_)));
    assert_eq!(p.factory.units_of(p.id, &newcomer.address()), 1);
}

#[test]
fn factory_requires_known_kyc_registry() {
    let mut world = World::new();
    let stray = Address::from_bytes([0x99; 32]);
    assert!(TokenFactory::deploy(&mut world.ledger, platform_config(), stray).is_err());
}

// ---------------------------------------------------------------------------
// Refunds
// ---------------------------------------------------------------------------

#[test]
fn revert_refunds_after_window_only() {
    let mut p = open_pool();
    p.buy(&bidder(1), 4).unwrap();
    p.buy(&bidder(2), 1).unwrap();

    p.world.advance(WINDOW - 1);
    let err = p.revert(&bidder(1)).unwrap_err();
    assert!(matches!(err, SettlementError::WindowStillOpen { .. }));

    p.world.advance(1);
    assert_eq!(p.revert(&bidder(1)).unwrap(), 400);
    assert_eq!(p.world.balance(&bidder(1).address()), 2_000);
    assert_eq!(p.factory.get_listing(p.id).unwrap().total_sold, 1);

    let err = p.revert(&bidder(1)).unwrap_err();
    assert!(matches!(err, SettlementError::NoTokensPurchased(_)));

    let err = p.revert(&bidder(3)).unwrap_err();
    assert!(matches!(err, SettlementError::NoTokensPurchased(a) if a == bidder(3).address()));

    assert_eq!(p.revert(&bidder(2)).unwrap(), 100);
    assert_eq!(p.world.balance(&p.factory.address()), 0);
}

#[test]
fn executed_listing_cannot_be_reverted() {
    let mut p = open_pool();
    p.buy(&bidder(1), UNITS).unwrap();
    p.execute().unwrap();
    p.world.advance(WINDOW);
    let err = p.revert(&bidder(1)).unwrap_err();
    assert!(matches!(err, SettlementError::InvalidState { .. }));
}

// ---------------------------------------------------------------------------
// Share transfers
// ---------------------------------------------------------------------------

#[test]
fn direct_share_transfer_is_restricted() {
    let mut p = open_pool();
    p.buy(&bidder(1), UNITS).unwrap();
    p.execute().unwrap();

    let ctx = p.world.ctx(&bidder(1));
    let id = p.id;
    let err = p
        .factory
        .share_class_mut(id)
        .unwrap()
        .transfer(&ctx, bidder(1).address(), bidder(2).address(), 1)
        .unwrap_err();
    assert!(matches!(err, SettlementError::TransferRestricted));
    assert_eq!(p.factory.shares_of(id, &bidder(1).address()), UNITS);
}

#[test]
fn shares_move_only_to_kyc_holders() {
    let mut p = open_pool();
    p.buy(&bidder(1), UNITS).unwrap();
    p.execute().unwrap();

    p.transfer_shares(&bidder(1), &bidder(2), 4).unwrap();
    assert_eq!(p.factory.shares_of(p.id, &bidder(1).address()), 6);
    assert_eq!(p.factory.shares_of(p.id, &bidder(2).address()), 4);

    let outsider = account(0xC2);
    let err = p.transfer_shares(&bidder(2), &outsider, 1).unwrap_err();
    assert!(matches!(err, SettlementError::AccessDenied(_)));

    p.world.revoke_kyc(&bidder(3));
    let err = p.transfer_shares(&bidder(1), &bidder(3), 1).unwrap_err();
    assert!(matches!(err, SettlementError::AccessDenied(_)));

    let err = p.transfer_shares(&bidder(2), &bidder(1), 5).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Funds);
    assert_eq!(p.factory.share_class(p.id).unwrap().total_supply(), UNITS);
}

// ---------------------------------------------------------------------------
// Listing management
// ---------------------------------------------------------------------------

#[test]
fn only_admin_or_seller_lists() {
    let mut world = World::new();
    let mut factory = TokenFactory::deploy(&mut world.ledger, platform_config(), world.kyc).unwrap();

    let ctx = world.ctx(&buyer());
    let err = factory
        .list_property(&world.ledger, &ctx, terms(world.token, UNITS))
        .unwrap_err();
    assert!(matches!(err, SettlementError::NotListingManager(_)));

    let ctx = world.ctx(&seller());
    let first = factory
        .list_property(&world.ledger, &ctx, terms(world.token, UNITS))
        .unwrap();
    let ctx = world.ctx(&admin());
    let second = factory
        .list_property(&world.ledger, &ctx, terms(world.token, 4))
        .unwrap();
    assert_eq!((first, second), (1, 2));
}

#[test]
fn listing_validation() {
    let mut world = World::new();
    let mut factory = TokenFactory::deploy(&mut world.ledger, platform_config(), world.kyc).unwrap();
    let ctx = world.ctx(&admin());

    let err = factory
        .list_property(&world.ledger, &ctx, terms(world.token, 0))
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidPrice));

    let mut zero_window = terms(world.token, UNITS);
    zero_window.window_duration = 0;
    let err = factory
        .list_property(&world.ledger, &ctx, zero_window)
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidWindow));

    let mut long_text = terms(world.token, UNITS);
    long_text.agreement_text = "x".repeat(parcel_protocol::config::MAX_AGREEMENT_TEXT_LEN + 1);
    assert!(factory.list_property(&world.ledger, &ctx, long_text).is_err());
}

#[test]
fn cancel_only_before_any_purchase() {
    let mut p = open_pool();
    let ctx = p.world.ctx(&bidder(1));
    let err = p.factory.cancel_listing(&ctx, p.id).unwrap_err();
    assert!(matches!(err, SettlementError::NotListingManager(_)));

    p.buy(&bidder(1), 1).unwrap();
    let ctx = p.world.ctx(&seller());
    let err = p.factory.cancel_listing(&ctx, p.id).unwrap_err();
    assert!(matches!(err, SettlementError::InvalidState { .. }));

    let ctx = p.world.ctx(&admin());
    let second = p
        .factory
        .list_property(&p.world.ledger, &ctx, terms(p.world.token, UNITS))
        .unwrap();
    p.factory.cancel_listing(&ctx, second).unwrap();
    assert_eq!(
        p.factory.get_listing(second).unwrap().status,
        ListingStatus::Cancelled
    );

    p.world.approve(&bidder(2), p.factory.address(), PRICE);
    let ctx = p.world.ctx(&bidder(2));
    let err = p
        .factory
        .buy_token(&mut p.world.ledger, &ctx, second, 1, &sign(&bidder(2), second))
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidState { .. }));
}
