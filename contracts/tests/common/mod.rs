//! Shared fixture for the contract integration tests: a ledger with one
//! payment token, one deed registry and one KYC registry, plus named
//! deterministic accounts.

#![allow(dead_code)]

use parcel_protocol::agreement::sign_agreement;
use parcel_protocol::config::PlatformConfig;
use parcel_protocol::crypto::{ParcelKeypair, ParcelSignature};
use parcel_protocol::ledger::{Address, CallContext, DeedId, DeedKey, DeedTerms, Ledger};

pub const GENESIS: u64 = 1_700_000_000;
pub const AGREEMENT: &str = "Buyer assumes the existing tenant lease at 12 Elm Street.";

pub fn account(seed: u8) -> ParcelKeypair {
    ParcelKeypair::from_seed(&[seed; 32])
}

pub fn seller() -> ParcelKeypair {
    account(0x51)
}

pub fn buyer() -> ParcelKeypair {
    account(0xB1)
}

pub fn bidder(n: u8) -> ParcelKeypair {
    account(0xB0 + n)
}

pub fn admin() -> ParcelKeypair {
    account(0xAD)
}

pub fn lien_provider() -> ParcelKeypair {
    account(0x11)
}

/// Issues the payment token, records deeds and runs KYC.
pub fn registrar() -> ParcelKeypair {
    account(0xF0)
}

/// Platform settings shared by every contract: `admin()` collects fees.
pub fn platform_config() -> PlatformConfig {
    PlatformConfig::new(admin().address())
}

pub fn sign(who: &ParcelKeypair, sale_id: u64) -> ParcelSignature {
    sign_agreement(who, sale_id, AGREEMENT).unwrap()
}

pub struct World {
    pub ledger: Ledger,
    pub token: Address,
    pub deeds: Address,
    pub kyc: Address,
}

impl World {
    pub fn new() -> Self {
        let _ = parcel_protocol::logging::init_logging(
            "warn",
            parcel_protocol::logging::LogFormat::Pretty,
        );
        let mut ledger = Ledger::new(GENESIS);
        let authority = registrar().address();
        let token = ledger.deploy_payment_token(authority, "Test Dollar", "TUSD");
        let deeds = ledger.deploy_deed_registry(authority, "County Deeds");
        let kyc = ledger.deploy_kyc_registry(authority, "Verified Investor", "KYC");
        Self {
            ledger,
            token,
            deeds,
            kyc,
        }
    }

    pub fn ctx(&self, who: &ParcelKeypair) -> CallContext {
        self.ledger.context(who.address())
    }

    pub fn now(&self) -> u64 {
        self.ledger.now()
    }

    pub fn advance(&mut self, seconds: u64) {
        self.ledger.advance(seconds);
    }

    pub fn fund(&mut self, who: &ParcelKeypair, amount: u64) {
        let ctx = self.ctx(&registrar());
        self.ledger
            .payment_token_mut(&self.token)
            .unwrap()
            .mint(&ctx, who.address(), amount)
            .unwrap();
    }

    pub fn approve(&mut self, owner: &ParcelKeypair, spender: Address, amount: u64) {
        let ctx = self.ctx(owner);
        self.ledger
            .payment_token_mut(&self.token)
            .unwrap()
            .approve(&ctx, spender, amount);
    }

    pub fn balance(&self, who: &Address) -> u64 {
        self.ledger.balance_of(&self.token, who).unwrap()
    }

    pub fn mint_deed(&mut self, owner: &ParcelKeypair, lien: Option<Address>) -> DeedId {
        let ctx = self.ctx(&registrar());
        self.ledger
            .deeds_mut(&self.deeds)
            .unwrap()
            .mint(
                &ctx,
                owner.address(),
                DeedTerms {
                    metadata_uri: "ipfs://elm-street".into(),
                    lien,
                    lease_hash: "lease-v1".into(),
                    agreement_text: AGREEMENT.into(),
                },
            )
            .unwrap()
    }

    pub fn approve_deed(&mut self, owner: &ParcelKeypair, spender: Address, id: DeedId) {
        let ctx = self.ctx(owner);
        self.ledger
            .deeds_mut(&self.deeds)
            .unwrap()
            .approve(&ctx, Some(spender), id)
            .unwrap();
    }

    pub fn owner_of(&self, id: DeedId) -> Address {
        self.ledger.deeds(&self.deeds).unwrap().owner_of(id).unwrap()
    }

    /// Put `amount` of the payment token into deed `id`'s reserve.
    pub fn fund_reserve(&mut self, who: &ParcelKeypair, id: DeedId, amount: u64) {
        let ctx = self.ctx(who);
        self.ledger
            .increase_reserve(&ctx, DeedKey::new(self.deeds, id), &self.token, amount)
            .unwrap();
    }

    pub fn reserve_of(&self, id: DeedId) -> u64 {
        self.ledger
            .deeds(&self.deeds)
            .unwrap()
            .reserve_of(id, &self.token)
    }

    /// A registry `owner` controls, holding one deed minted to `owner`.
    /// Its id collides with the first deed of the shared registry.
    pub fn rogue_deed(&mut self, owner: &ParcelKeypair, spender: Address) -> DeedKey {
        let registry = self.ledger.deploy_deed_registry(owner.address(), "Rogue Deeds");
        let ctx = self.ctx(owner);
        let deeds = self.ledger.deeds_mut(&registry).unwrap();
        let id = deeds
            .mint(
                &ctx,
                owner.address(),
                DeedTerms {
                    agreement_text: AGREEMENT.into(),
                    ..DeedTerms::default()
                },
            )
            .unwrap();
        deeds.approve(&ctx, Some(spender), id).unwrap();
        DeedKey::new(registry, id)
    }

    pub fn grant_kyc(&mut self, who: &ParcelKeypair) {
        let ctx = self.ctx(&registrar());
        self.ledger
            .kyc_mut(&self.kyc)
            .unwrap()
            .mint(&ctx, who.address())
            .unwrap();
    }

    pub fn revoke_kyc(&mut self, who: &ParcelKeypair) {
        let ctx = self.ctx(&registrar());
        self.ledger
            .kyc_mut(&self.kyc)
            .unwrap()
            .revoke(&ctx, who.address())
            .unwrap();
    }
}
