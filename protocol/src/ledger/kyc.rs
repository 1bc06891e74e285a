//! # KYC Registry
//!
//! Non-transferable identity credentials. An account is "authorized" while
//! it holds a credential; the registry admin mints and revokes them. The
//! fractional factory reads this to gate share purchases and transfers.

use std::collections::HashMap;

use super::{Address, CallContext, LedgerError};

/// Credential serial number. Never reused, even after revocation.
pub type CredentialId = u64;

#[derive(Debug, Clone)]
pub struct KycRegistry {
    address: Address,
    admin: Address,
    name: String,
    symbol: String,
    next_credential: CredentialId,
    credentials: HashMap<Address, CredentialId>,
}

impl KycRegistry {
    pub(crate) fn new(address: Address, admin: Address, name: &str, symbol: &str) -> Self {
        Self {
            address,
            admin,
            name: name.to_string(),
            symbol: symbol.to_string(),
            next_credential: 1,
            credentials: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_authorized(&self, account: &Address) -> bool {
        self.credentials.contains_key(account)
    }

    pub fn credential_of(&self, account: &Address) -> Option<CredentialId> {
        self.credentials.get(account).copied()
    }

    /// Issue a credential to `account`.
    pub fn mint(&mut self, ctx: &CallContext, account: Address) -> Result<CredentialId, LedgerError> {
        self.require_admin(ctx, "mint credential")?;
        if self.is_authorized(&account) {
            return Err(LedgerError::AlreadyAuthorized(account));
        }
        let id = self.next_credential;
        self.next_credential = id.checked_add(1).ok_or(LedgerError::AmountOverflow)?;
        self.credentials.insert(account, id);
        tracing::debug!(registry = %self.symbol, %account, credential = id, "kyc credential issued");
        Ok(id)
    }

    /// Burn `account`'s credential, returning its id.
    pub fn revoke(&mut self, ctx: &CallContext, account: Address) -> Result<CredentialId, LedgerError> {
        self.require_admin(ctx, "revoke credential")?;
        let id = self
            .credentials
            .remove(&account)
            .ok_or(LedgerError::NotAuthorized(account))?;
        tracing::debug!(registry = %self.symbol, %account, credential = id, "kyc credential revoked");
        Ok(id)
    }

    fn require_admin(&self, ctx: &CallContext, action: &'static str) -> Result<(), LedgerError> {
        if ctx.caller != self.admin {
            return Err(LedgerError::Unauthorized {
                caller: ctx.caller,
                action,
            });
        }
        Ok(())
    }
}
