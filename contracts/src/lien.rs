//! # Lien Module
//!
//! A lien is a third party's claim against a property: whoever sells the
//! property must pay the lien provider first. Two flavours:
//!
//! - **Static**: a fixed balance that only goes down when paid.
//! - **Parametric**: a balance that accrues `rate_per_period` every elapsed
//!   `period` since `accrual_start`. Nothing ticks in the background; the
//!   balance is a pure function of the clock and is recomputed on every read.
//!
//! `pay` never fails for asking too much. It transfers
//! `min(requested, payer's allowance to the lien, balance owed)` and reports
//! how much actually moved.
//!
//! Liens live in a [`LienBook`], which gives each one its own ledger address.
//! That address is what payers approve as the spender, and what a deed's
//! `lien` field points at.

use parcel_protocol::ledger::{rollback_on_error, Address, CallContext, Ledger, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SettlementError;

/// How a lien's balance evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LienTerms {
    Static {
        balance: u64,
    },
    Parametric {
        accrual_start: Timestamp,
        period: u64,
        rate_per_period: u64,
        paid: u64,
    },
}

/// A single lien.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lien {
    pub address: Address,
    pub provider: Address,
    pub payment_token: Address,
    pub terms: LienTerms,
}

/// Amount owed on a parametric lien at `now`.
///
/// `floor((now - accrual_start) / period) * rate - paid`, saturating at zero
/// on both ends. A zero period accrues nothing.
pub fn accrued_balance(
    now: Timestamp,
    accrual_start: Timestamp,
    period: u64,
    rate_per_period: u64,
    paid: u64,
) -> u64 {
    let elapsed = now.saturating_sub(accrual_start);
    let periods = elapsed.checked_div(period).unwrap_or(0);
    periods.saturating_mul(rate_per_period).saturating_sub(paid)
}

impl Lien {
    /// Current amount owed.
    pub fn balance_view(&self, now: Timestamp) -> u64 {
        match self.terms {
            LienTerms::Static { balance } => balance,
            LienTerms::Parametric {
                accrual_start,
                period,
                rate_per_period,
                paid,
            } => accrued_balance(now, accrual_start, period, rate_per_period, paid),
        }
    }

    /// Book a payment of `amount`, which the caller has already capped at
    /// the balance owed.
    fn record_payment(&mut self, amount: u64) -> Result<(), SettlementError> {
        match &mut self.terms {
            LienTerms::Static { balance } => {
                *balance = balance
                    .checked_sub(amount)
                    .ok_or(SettlementError::AmountOverflow)?;
            }
            LienTerms::Parametric { paid, .. } => {
                *paid = paid
                    .checked_add(amount)
                    .ok_or(SettlementError::AmountOverflow)?;
            }
        }
        Ok(())
    }
}

/// Registry of every lien, keyed by lien address.
#[derive(Debug, Clone, Default)]
pub struct LienBook {
    liens: BTreeMap<Address, Lien>,
}

impl LienBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a static lien owed to the caller.
    pub fn create_static(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        payment_token: Address,
        balance: u64,
    ) -> Result<Address, SettlementError> {
        self.create(ledger, ctx, payment_token, LienTerms::Static { balance })
    }

    /// Register a parametric lien owed to the caller, accruing from now.
    pub fn create_parametric(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        payment_token: Address,
        rate_per_period: u64,
        period: u64,
    ) -> Result<Address, SettlementError> {
        if period == 0 {
            return Err(SettlementError::InvalidPeriod);
        }
        self.create(
            ledger,
            ctx,
            payment_token,
            LienTerms::Parametric {
                accrual_start: ctx.now,
                period,
                rate_per_period,
                paid: 0,
            },
        )
    }

    fn create(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        payment_token: Address,
        terms: LienTerms,
    ) -> Result<Address, SettlementError> {
        ledger.payment_token(&payment_token)?;
        let address = ledger.allocate_address("lien");
        self.liens.insert(
            address,
            Lien {
                address,
                provider: ctx.caller,
                payment_token,
                terms,
            },
        );
        tracing::info!(lien = %address, provider = %ctx.caller, ?terms, "lien created");
        Ok(address)
    }

    pub fn lien(&self, address: &Address) -> Result<&Lien, SettlementError> {
        self.liens
            .get(address)
            .ok_or(SettlementError::UnknownLien(*address))
    }

    pub fn balance_view(&self, address: &Address, now: Timestamp) -> Result<u64, SettlementError> {
        Ok(self.lien(address)?.balance_view(now))
    }

    /// Pay down lien `address` from the caller's funds.
    ///
    /// Returns the amount actually transferred to the provider, which may be
    /// zero. The only failure after capping is the underlying transfer
    /// itself, e.g. the payer's balance is below its allowance; that aborts
    /// the call with nothing recorded.
    pub fn pay(
        &mut self,
        ledger: &mut Ledger,
        ctx: &CallContext,
        address: Address,
        amount: u64,
    ) -> Result<u64, SettlementError> {
        let lien = self.lien(&address)?.clone();
        let owed = lien.balance_view(ctx.now);
        let allowance = ledger.allowance(&lien.payment_token, &ctx.caller, &address)?;
        let payment = amount.min(allowance).min(owed);
        if payment == 0 {
            return Ok(0);
        }

        let settled: Result<(), SettlementError> = rollback_on_error(&mut self.liens, |liens| {
            ledger.transact(|ledger| {
                let entry = liens
                    .get_mut(&address)
                    .ok_or(SettlementError::UnknownLien(address))?;
                entry.record_payment(payment)?;
                ledger
                    .payment_token_mut(&lien.payment_token)?
                    .transfer_from(&ctx.as_contract(address), ctx.caller, lien.provider, payment)?;
                Ok(())
            })
        });
        settled?;

        tracing::info!(
            lien = %address,
            payer = %ctx.caller,
            amount = payment,
            remaining = owed - payment,
            "lien paid"
        );
        Ok(payment)
    }
}
