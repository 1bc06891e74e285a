//! # Payment Tokens
//!
//! A fungible token with the standard balance/allowance surface. The
//! settlement contracts never touch balances directly: they pull funds with
//! `transfer_from` (spending an allowance the payer granted them) and pay
//! out with `transfer` from their own custody address.
//!
//! Every mutating method validates first and writes second, so a failed
//! call leaves the token exactly as it found it.

use std::collections::HashMap;

use super::{Address, CallContext, LedgerError};

/// Balance and allowance state for one payment token.
#[derive(Debug, Clone)]
pub struct PaymentToken {
    address: Address,
    name: String,
    symbol: String,
    issuer: Address,
    total_supply: u64,
    balances: HashMap<Address, u64>,
    /// `(owner, spender) -> remaining allowance`.
    allowances: HashMap<(Address, Address), u64>,
}

impl PaymentToken {
    pub(crate) fn new(address: Address, issuer: Address, name: &str, symbol: &str) -> Self {
        Self {
            address,
            name: name.to_string(),
            symbol: symbol.to_string(),
            issuer,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
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

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Issue new supply to `to`. Only the issuer may mint.
    pub fn mint(&mut self, ctx: &CallContext, to: Address, amount: u64) -> Result<(), LedgerError> {
        if ctx.caller != self.issuer {
            return Err(LedgerError::Unauthorized {
                caller: ctx.caller,
                action: "mint payment token",
            });
        }
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        let new_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        self.total_supply = new_supply;
        self.balances.insert(to, new_balance);
        Ok(())
    }

    pub fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Set (not add to) the allowance `spender` may pull from the caller.
    pub fn approve(&mut self, ctx: &CallContext, spender: Address, amount: u64) {
        if amount == 0 {
            self.allowances.remove(&(ctx.caller, spender));
        } else {
            self.allowances.insert((ctx.caller, spender), amount);
        }
    }

    /// Move `amount` from the caller to `to`.
    pub fn transfer(
        &mut self,
        ctx: &CallContext,
        to: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.move_balance(ctx.caller, to, amount)
    }

    /// Move `amount` from `from` to `to`, spending the caller's allowance.
    ///
    /// A caller moving its own funds needs no allowance.
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let spender = ctx.caller;
        if spender == from {
            return self.move_balance(from, to, amount);
        }

        let available = self.allowance(&from, &spender);
        if available < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from,
                spender,
                available,
                requested: amount,
            });
        }
        self.move_balance(from, to, amount)?;
        let remaining = available - amount;
        if remaining == 0 {
            self.allowances.remove(&(from, spender));
        } else {
            self.allowances.insert((from, spender), remaining);
        }
        Ok(())
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: u64) -> Result<(), LedgerError> {
        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                available: from_balance,
                requested: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;

        self.balances.insert(from, from_balance - amount);
        self.balances.insert(to, to_balance);
        tracing::trace!(token = %self.symbol, %from, %to, amount, "payment transfer");
        Ok(())
    }
}
