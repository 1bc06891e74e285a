//! # Deed Registry
//!
//! Non-fungible property deeds. Besides ownership, each deed carries the
//! property-level facts a settlement needs to read back: an optional lien
//! module, the lease hash and the agreement text a buyer must sign.
//!
//! Transfer authority follows the usual three-way rule: the owner, the
//! single approved address for that deed, or an operator the owner approved
//! for all of its deeds.
//!
//! ## Reserve
//!
//! A deed can carry a reserve: payment tokens parked under the registry's
//! address and earmarked for that deed, one balance per payment token. Anyone
//! may top it up. Only whoever may currently move the deed may draw from it,
//! which during a sale is the escrow contract holding it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::{Address, CallContext, LedgerError, PaymentToken};
use crate::config::MAX_AGREEMENT_TEXT_LEN;

/// Deed identifier, unique within one registry. Starts at 1.
pub type DeedId = u64;

/// A deed's handle across registries: ids only repeat between registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeedKey {
    pub registry: Address,
    pub id: DeedId,
}

impl DeedKey {
    pub fn new(registry: Address, id: DeedId) -> Self {
        Self { registry, id }
    }
}

impl fmt::Display for DeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.registry, self.id)
    }
}

/// Property facts recorded at mint time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeedTerms {
    pub metadata_uri: String,
    /// Lien module that must be settled on every sale, if any.
    pub lien: Option<Address>,
    pub lease_hash: String,
    pub agreement_text: String,
}

/// A single deed and its current authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deed {
    pub id: DeedId,
    pub owner: Address,
    pub approved: Option<Address>,
    pub terms: DeedTerms,
}

/// One deed collection.
#[derive(Debug, Clone)]
pub struct DeedRegistry {
    address: Address,
    name: String,
    minter: Address,
    next_id: DeedId,
    deeds: BTreeMap<DeedId, Deed>,
    /// `(owner, operator)` pairs with blanket approval.
    operators: HashSet<(Address, Address)>,
    /// `(deed, payment token)` to reserved amount.
    reserves: BTreeMap<(DeedId, Address), u64>,
}

impl DeedRegistry {
    pub(crate) fn new(address: Address, minter: Address, name: &str) -> Self {
        Self {
            address,
            name: name.to_string(),
            minter,
            next_id: 1,
            deeds: BTreeMap::new(),
            operators: HashSet::new(),
            reserves: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a new deed for `to`. Only the registry's minter may record.
    pub fn mint(
        &mut self,
        ctx: &CallContext,
        to: Address,
        terms: DeedTerms,
    ) -> Result<DeedId, LedgerError> {
        if ctx.caller != self.minter {
            return Err(LedgerError::Unauthorized {
                caller: ctx.caller,
                action: "mint deed",
            });
        }
        if terms.agreement_text.len() > MAX_AGREEMENT_TEXT_LEN {
            return Err(LedgerError::AgreementTooLong {
                len: terms.agreement_text.len(),
                max: MAX_AGREEMENT_TEXT_LEN,
            });
        }

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(LedgerError::AmountOverflow)?;
        self.deeds.insert(
            id,
            Deed {
                id,
                owner: to,
                approved: None,
                terms,
            },
        );
        tracing::debug!(registry = %self.name, deed = id, owner = %to, "deed minted");
        Ok(id)
    }

    pub fn deed(&self, id: DeedId) -> Result<&Deed, LedgerError> {
        self.deeds.get(&id).ok_or(LedgerError::DeedNotFound {
            registry: self.address,
            id,
        })
    }

    pub fn owner_of(&self, id: DeedId) -> Result<Address, LedgerError> {
        Ok(self.deed(id)?.owner)
    }

    pub fn lien_of(&self, id: DeedId) -> Result<Option<Address>, LedgerError> {
        Ok(self.deed(id)?.terms.lien)
    }

    pub fn agreement_text(&self, id: DeedId) -> Result<&str, LedgerError> {
        Ok(&self.deed(id)?.terms.agreement_text)
    }

    pub fn get_approved(&self, id: DeedId) -> Result<Option<Address>, LedgerError> {
        Ok(self.deed(id)?.approved)
    }

    /// Amount of `token` reserved for deed `id`.
    pub fn reserve_of(&self, id: DeedId, token: &Address) -> u64 {
        self.reserves.get(&(id, *token)).copied().unwrap_or(0)
    }

    /// Number of deeds held by `owner`.
    pub fn balance_of(&self, owner: &Address) -> usize {
        self.deeds.values().filter(|d| d.owner == *owner).count()
    }

    pub fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> bool {
        self.operators.contains(&(*owner, *operator))
    }

    /// Approve `to` for a single deed. Owner or operator only.
    pub fn approve(
        &mut self,
        ctx: &CallContext,
        to: Option<Address>,
        id: DeedId,
    ) -> Result<(), LedgerError> {
        let owner = self.owner_of(id)?;
        if ctx.caller != owner && !self.is_approved_for_all(&owner, &ctx.caller) {
            return Err(LedgerError::NotApproved {
                id,
                spender: ctx.caller,
            });
        }
        if let Some(deed) = self.deeds.get_mut(&id) {
            deed.approved = to;
        }
        Ok(())
    }

    pub fn set_approval_for_all(&mut self, ctx: &CallContext, operator: Address, approved: bool) {
        if approved {
            self.operators.insert((ctx.caller, operator));
        } else {
            self.operators.remove(&(ctx.caller, operator));
        }
    }

    /// Can `spender` move deed `id` right now?
    pub fn is_approved_or_owner(&self, spender: &Address, id: DeedId) -> Result<bool, LedgerError> {
        let deed = self.deed(id)?;
        Ok(deed.owner == *spender
            || deed.approved == Some(*spender)
            || self.is_approved_for_all(&deed.owner, spender))
    }

    /// Move deed `id` from `from` to `to`. Clears the single-deed approval.
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: Address,
        to: Address,
        id: DeedId,
    ) -> Result<(), LedgerError> {
        let owner = self.owner_of(id)?;
        if owner != from {
            return Err(LedgerError::NotDeedOwner { id, claimed: from });
        }
        if !self.is_approved_or_owner(&ctx.caller, id)? {
            return Err(LedgerError::NotApproved {
                id,
                spender: ctx.caller,
            });
        }
        if let Some(deed) = self.deeds.get_mut(&id) {
            deed.owner = to;
            deed.approved = None;
        }
        tracing::trace!(registry = %self.name, deed = id, %from, %to, "deed transfer");
        Ok(())
    }

    /// Move `amount` of `token` from the caller into deed `id`'s reserve.
    /// Returns the new reserve.
    pub fn increase_reserve(
        &mut self,
        ctx: &CallContext,
        token: &mut PaymentToken,
        id: DeedId,
        amount: u64,
    ) -> Result<u64, LedgerError> {
        self.deed(id)?;
        let key = (id, token.address());
        let total = self
            .reserve_of(id, &key.1)
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        token.transfer(ctx, self.address, amount)?;
        self.reserves.insert(key, total);
        tracing::debug!(registry = %self.name, deed = id, from = %ctx.caller, amount, total, "reserve increased");
        Ok(total)
    }

    /// Pay up to `amount` of `token` out of deed `id`'s reserve to `to`.
    /// Returns what was paid, capped by the reserve.
    pub fn draw_reserve(
        &mut self,
        ctx: &CallContext,
        token: &mut PaymentToken,
        id: DeedId,
        to: Address,
        amount: u64,
    ) -> Result<u64, LedgerError> {
        if !self.is_approved_or_owner(&ctx.caller, id)? {
            return Err(LedgerError::NotApproved {
                id,
                spender: ctx.caller,
            });
        }
        let key = (id, token.address());
        let reserve = self.reserve_of(id, &key.1);
        let drawn = amount.min(reserve);
        if drawn == 0 {
            return Ok(0);
        }
        token.transfer(&ctx.as_contract(self.address), to, drawn)?;
        if drawn == reserve {
            self.reserves.remove(&key);
        } else {
            self.reserves.insert(key, reserve - drawn);
        }
        tracing::debug!(registry = %self.name, deed = id, %to, drawn, "reserve drawn");
        Ok(drawn)
    }
}
