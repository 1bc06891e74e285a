//! # Escrowed Resources
//!
//! Every settlement contract holds deeds and payment funds under its own
//! address for the lifetime of a pending sale. [`Custody`] is that address
//! plus the four moves a contract ever makes with it: pull funds in, pay
//! funds out, pull a deed in, hand a deed out.
//!
//! Pulls go through the ledger's `transfer_from` with the contract as
//! spender, so they only succeed if the counterparty approved the contract
//! beforehand. Releases are plain transfers from the contract's own balance.

use parcel_protocol::ledger::{
    rollback_on_error, Address, CallContext, DeedId, Ledger, LedgerError,
};

use crate::error::SettlementError;

/// A contract's custody address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Custody {
    holder: Address,
}

impl Custody {
    pub fn new(holder: Address) -> Self {
        Self { holder }
    }

    pub fn holder(&self) -> Address {
        self.holder
    }

    fn as_holder(&self, ctx: &CallContext) -> CallContext {
        ctx.as_contract(self.holder)
    }

    /// Pull `amount` of `token` from `from` into custody.
    pub fn pull_funds(
        &self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        token: &Address,
        from: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        ledger
            .payment_token_mut(token)?
            .transfer_from(&self.as_holder(ctx), from, self.holder, amount)?;
        tracing::debug!(holder = %self.holder, %from, amount, "funds pulled into custody");
        Ok(())
    }

    /// Pay `amount` of `token` out of custody to `to`. Zero is a no-op.
    pub fn release_funds(
        &self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        token: &Address,
        to: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        ledger
            .payment_token_mut(token)?
            .transfer(&self.as_holder(ctx), to, amount)?;
        tracing::debug!(holder = %self.holder, %to, amount, "funds released from custody");
        Ok(())
    }

    /// Let `spender` pull up to `amount` of `token` out of custody.
    pub fn approve_funds(
        &self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        token: &Address,
        spender: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        ledger
            .payment_token_mut(token)?
            .approve(&self.as_holder(ctx), spender, amount);
        Ok(())
    }

    /// Take deed `id` from `from` into custody.
    pub fn pull_deed(
        &self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        registry: &Address,
        id: DeedId,
        from: Address,
    ) -> Result<(), LedgerError> {
        ledger
            .deeds_mut(registry)?
            .transfer_from(&self.as_holder(ctx), from, self.holder, id)?;
        tracing::debug!(holder = %self.holder, deed = id, %from, "deed pulled into custody");
        Ok(())
    }

    /// Hand deed `id` from custody to `to`.
    pub fn release_deed(
        &self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        registry: &Address,
        id: DeedId,
        to: Address,
    ) -> Result<(), LedgerError> {
        let holder = self.holder;
        ledger
            .deeds_mut(registry)?
            .transfer_from(&self.as_holder(ctx), holder, to, id)?;
        tracing::debug!(holder = %holder, deed = id, %to, "deed released from custody");
        Ok(())
    }
}

/// Run `f` over a contract's record table and the ledger as one unit.
///
/// Both are snapshotted first and both are restored if `f` fails, so a
/// transfer that fails after the record transition leaves no trace.
pub(crate) fn atomically<S, T, F>(
    records: &mut S,
    ledger: &mut Ledger,
    f: F,
) -> Result<T, SettlementError>
where
    S: Clone,
    F: FnOnce(&mut S, &mut Ledger) -> Result<T, SettlementError>,
{
    rollback_on_error(records, |records| ledger.transact(|ledger| f(records, ledger)))
}
