//! # Ledger
//!
//! The in-memory host the settlement contracts run against: a block clock,
//! payment tokens, deed registries and KYC registries, all addressed by
//! [`Address`].
//!
//! ## Call semantics
//!
//! Every contract entry point receives a [`CallContext`] captured once at
//! the start of the call: who is calling and what the block time is. Time
//! never moves inside a call.
//!
//! A call either completes or leaves no trace. [`Ledger::transact`] snapshots
//! the whole ledger and restores it if the closure returns `Err`, so a
//! settlement that fails on its third transfer does not leave the first two
//! behind.

pub mod address;
pub mod deed;
pub mod kyc;
pub mod payment;

pub use address::Address;
pub use deed::{Deed, DeedId, DeedKey, DeedRegistry, DeedTerms};
pub use kyc::{CredentialId, KycRegistry};
pub use payment::PaymentToken;

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Seconds since the Unix epoch, as reported by the ledger clock.
pub type Timestamp = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("no {kind} deployed at {address}")]
    UnknownContract { kind: &'static str, address: Address },

    #[error("{caller} is not allowed to {action}")]
    Unauthorized {
        caller: Address,
        action: &'static str,
    },

    #[error("insufficient balance for {account}: have {available}, need {requested}")]
    InsufficientBalance {
        account: Address,
        available: u64,
        requested: u64,
    },

    #[error("insufficient allowance from {owner} to {spender}: have {available}, need {requested}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        available: u64,
        requested: u64,
    },

    #[error("amount overflow")]
    AmountOverflow,

    #[error("deed {id} not found in registry {registry}")]
    DeedNotFound { registry: Address, id: DeedId },

    #[error("deed {id} is not owned by {claimed}")]
    NotDeedOwner { id: DeedId, claimed: Address },

    #[error("{spender} is not approved to move deed {id}")]
    NotApproved { id: DeedId, spender: Address },

    #[error("agreement text is {len} bytes, limit is {max}")]
    AgreementTooLong { len: usize, max: usize },

    #[error("{0} already holds a credential")]
    AlreadyAuthorized(Address),

    #[error("{0} holds no credential")]
    NotAuthorized(Address),
}

// ---------------------------------------------------------------------------
// Call context
// ---------------------------------------------------------------------------

/// Caller identity and block time for a single contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }

    /// The same call, re-issued by a contract acting as itself.
    pub fn as_contract(&self, contract: Address) -> Self {
        Self {
            caller: contract,
            now: self.now,
        }
    }
}

/// Run `f` against `state`; if it fails, put `state` back how it was.
///
/// Nest it once per independently owned piece of state that a call touches.
pub fn rollback_on_error<S, T, E, F>(state: &mut S, f: F) -> Result<T, E>
where
    S: Clone,
    F: FnOnce(&mut S) -> Result<T, E>,
{
    let snapshot = state.clone();
    let result = f(state);
    if result.is_err() {
        *state = snapshot;
    }
    result
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Ledger {
    now: Timestamp,
    height: u64,
    deploy_nonce: u64,
    payment_tokens: HashMap<Address, PaymentToken>,
    deed_registries: HashMap<Address, DeedRegistry>,
    kyc_registries: HashMap<Address, KycRegistry>,
}

impl Ledger {
    /// A ledger whose clock starts at `genesis`.
    pub fn new(genesis: Timestamp) -> Self {
        Self {
            now: genesis,
            height: 0,
            deploy_nonce: 0,
            payment_tokens: HashMap::new(),
            deed_registries: HashMap::new(),
            kyc_registries: HashMap::new(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Block time as a UTC datetime, for receipts and logs.
    pub fn block_time(&self) -> DateTime<Utc> {
        timestamp_to_utc(self.now)
    }

    /// Produce a new block `seconds` later.
    pub fn advance(&mut self, seconds: u64) {
        self.now = self.now.saturating_add(seconds);
        self.height += 1;
    }

    /// Capture a call context for `caller` at the current block.
    pub fn context(&self, caller: Address) -> CallContext {
        CallContext::new(caller, self.now)
    }

    /// Reserve a fresh contract address of the given kind.
    pub fn allocate_address(&mut self, kind: &str) -> Address {
        self.deploy_nonce += 1;
        Address::contract(kind, &self.deploy_nonce.to_string())
    }

    /// Snapshot the ledger and restore it if `f` fails.
    pub fn transact<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Ledger) -> Result<T, E>,
    {
        rollback_on_error(self, f)
    }

    // -- deployment --------------------------------------------------------

    pub fn deploy_payment_token(&mut self, issuer: Address, name: &str, symbol: &str) -> Address {
        let address = self.allocate_address("payment-token");
        self.payment_tokens
            .insert(address, PaymentToken::new(address, issuer, name, symbol));
        tracing::debug!(%address, symbol, "payment token deployed");
        address
    }

    pub fn deploy_deed_registry(&mut self, minter: Address, name: &str) -> Address {
        let address = self.allocate_address("deed-registry");
        self.deed_registries
            .insert(address, DeedRegistry::new(address, minter, name));
        tracing::debug!(%address, name, "deed registry deployed");
        address
    }

    pub fn deploy_kyc_registry(&mut self, admin: Address, name: &str, symbol: &str) -> Address {
        let address = self.allocate_address("kyc-registry");
        self.kyc_registries
            .insert(address, KycRegistry::new(address, admin, name, symbol));
        tracing::debug!(%address, symbol, "kyc registry deployed");
        address
    }

    // -- lookup ------------------------------------------------------------

    pub fn payment_token(&self, address: &Address) -> Result<&PaymentToken, LedgerError> {
        self.payment_tokens
            .get(address)
            .ok_or(LedgerError::UnknownContract {
                kind: "payment token",
                address: *address,
            })
    }

    pub fn payment_token_mut(&mut self, address: &Address) -> Result<&mut PaymentToken, LedgerError> {
        self.payment_tokens
            .get_mut(address)
            .ok_or(LedgerError::UnknownContract {
                kind: "payment token",
                address: *address,
            })
    }

    pub fn deeds(&self, address: &Address) -> Result<&DeedRegistry, LedgerError> {
        self.deed_registries
            .get(address)
            .ok_or(LedgerError::UnknownContract {
                kind: "deed registry",
                address: *address,
            })
    }

    pub fn deeds_mut(&mut self, address: &Address) -> Result<&mut DeedRegistry, LedgerError> {
        self.deed_registries
            .get_mut(address)
            .ok_or(LedgerError::UnknownContract {
                kind: "deed registry",
                address: *address,
            })
    }

    pub fn kyc(&self, address: &Address) -> Result<&KycRegistry, LedgerError> {
        self.kyc_registries
            .get(address)
            .ok_or(LedgerError::UnknownContract {
                kind: "kyc registry",
                address: *address,
            })
    }

    pub fn kyc_mut(&mut self, address: &Address) -> Result<&mut KycRegistry, LedgerError> {
        self.kyc_registries
            .get_mut(address)
            .ok_or(LedgerError::UnknownContract {
                kind: "kyc registry",
                address: *address,
            })
    }

    // -- deed reserves -----------------------------------------------------

    /// Move `amount` of `token` from the caller into `deed`'s reserve.
    /// Returns the new reserve.
    pub fn increase_reserve(
        &mut self,
        ctx: &CallContext,
        deed: DeedKey,
        token: &Address,
        amount: u64,
    ) -> Result<u64, LedgerError> {
        let (registry, token) = self.registry_and_token(&deed.registry, token)?;
        registry.increase_reserve(ctx, token, deed.id, amount)
    }

    /// Pay up to `amount` of `token` from `deed`'s reserve to `to`. The caller
    /// must be allowed to move the deed. Returns what was paid.
    pub fn draw_reserve(
        &mut self,
        ctx: &CallContext,
        deed: DeedKey,
        token: &Address,
        to: Address,
        amount: u64,
    ) -> Result<u64, LedgerError> {
        let (registry, token) = self.registry_and_token(&deed.registry, token)?;
        registry.draw_reserve(ctx, token, deed.id, to, amount)
    }

    fn registry_and_token(
        &mut self,
        registry: &Address,
        token: &Address,
    ) -> Result<(&mut DeedRegistry, &mut PaymentToken), LedgerError> {
        let registry = self
            .deed_registries
            .get_mut(registry)
            .ok_or(LedgerError::UnknownContract {
                kind: "deed registry",
                address: *registry,
            })?;
        let token = self
            .payment_tokens
            .get_mut(token)
            .ok_or(LedgerError::UnknownContract {
                kind: "payment token",
                address: *token,
            })?;
        Ok((registry, token))
    }

    // -- convenience -------------------------------------------------------

    pub fn balance_of(&self, token: &Address, account: &Address) -> Result<u64, LedgerError> {
        Ok(self.payment_token(token)?.balance_of(account))
    }

    pub fn allowance(
        &self,
        token: &Address,
        owner: &Address,
        spender: &Address,
    ) -> Result<u64, LedgerError> {
        Ok(self.payment_token(token)?.allowance(owner, spender))
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Convert a ledger timestamp to UTC. Out-of-range values clamp to the epoch.
pub fn timestamp_to_utc(ts: Timestamp) -> DateTime<Utc> {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    #[test]
    fn clock_advances_per_block() {
        let mut ledger = Ledger::new(1_000);
        ledger.advance(30);
        assert_eq!(ledger.now(), 1_030);
        assert_eq!(ledger.height(), 1);
        assert_eq!(ledger.context(addr(1)).now, 1_030);
        assert_eq!(ledger.block_time().timestamp(), 1_030);
    }

    #[test]
    fn deployments_get_distinct_addresses() {
        let mut ledger = Ledger::default();
        let a = ledger.deploy_payment_token(addr(1), "Dollar", "USD");
        let b = ledger.deploy_payment_token(addr(1), "Dollar", "USD");
        assert_ne!(a, b);
        assert!(ledger.payment_token(&a).is_ok());
        assert!(matches!(
            ledger.deeds(&a),
            Err(LedgerError::UnknownContract { kind: "deed registry", .. })
        ));
    }

    #[test]
    fn transact_rolls_back_on_error() {
        let mut ledger = Ledger::default();
        let token = ledger.deploy_payment_token(addr(1), "Dollar", "USD");
        let issuer = ledger.context(addr(1));
        ledger
            .payment_token_mut(&token)
            .unwrap()
            .mint(&issuer, addr(2), 100)
            .unwrap();

        let result: Result<(), LedgerError> = ledger.transact(|l| {
            let ctx = l.context(addr(2));
            let t = l.payment_token_mut(&token)?;
            t.transfer(&ctx, addr(3), 60)?;
            t.transfer(&ctx, addr(3), 60)?;
            Ok(())
        });

        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert_eq!(ledger.balance_of(&token, &addr(2)).unwrap(), 100);
        assert_eq!(ledger.balance_of(&token, &addr(3)).unwrap(), 0);
    }

    #[test]
    fn reserve_needs_known_registry_and_token() {
        let mut ledger = Ledger::default();
        let token = ledger.deploy_payment_token(addr(1), "Dollar", "USD");
        let registry = ledger.deploy_deed_registry(addr(1), "Deeds");
        let ctx = ledger.context(addr(2));

        let err = ledger
            .increase_reserve(&ctx, DeedKey::new(token, 1), &token, 5)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownContract { kind: "deed registry", .. }));

        let err = ledger
            .draw_reserve(&ctx, DeedKey::new(registry, 1), &registry, addr(2), 5)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownContract { kind: "payment token", .. }));
    }

    #[test]
    fn rollback_on_error_keeps_success() {
        let mut counter = 1u32;
        let ok: Result<(), ()> = rollback_on_error(&mut counter, |c| {
            *c += 1;
            Ok(())
        });
        assert!(ok.is_ok());
        assert_eq!(counter, 2);

        let err: Result<(), ()> = rollback_on_error(&mut counter, |c| {
            *c += 10;
            Err(())
        });
        assert!(err.is_err());
        assert_eq!(counter, 2);
    }
}
