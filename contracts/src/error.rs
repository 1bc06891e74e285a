//! # Settlement Errors
//!
//! One error enum shared by every settlement contract. Each variant belongs
//! to exactly one [`ErrorCategory`], so a caller can branch on "was this my
//! fault, the record's, the clock's, or the money's" without matching every
//! variant.

use parcel_protocol::config::ConfigError;
use parcel_protocol::ledger::{Address, DeedId, LedgerError, Timestamp};
use thiserror::Error;

/// Broad class of a [`SettlementError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Wrong signer, missing credential, or caller lacks the role.
    Authorization,
    /// The record is not in a state that permits the operation.
    State,
    /// The operation is outside its valid time range.
    Window,
    /// Not enough money, or not enough money to beat the current bid.
    Funds,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    // -- authorization ---------------------------------------------------
    #[error("agreement signature does not match the caller")]
    IncorrectSignature,

    #[error("{0} is not the seller")]
    NotSeller(Address),

    #[error("{0} is not the buyer")]
    NotBuyer(Address),

    #[error("{0} is not the designated buyer for this listing")]
    NotDesignatedBuyer(Address),

    #[error("the seller cannot bid on its own auction")]
    SellerCannotBid,

    #[error("{0} is not KYC authorized")]
    AccessDenied(Address),

    #[error("shares can only move through the factory")]
    TransferRestricted,

    #[error("{0} may not manage this listing")]
    NotListingManager(Address),

    // -- state -----------------------------------------------------------
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("no lien at {0}")]
    UnknownLien(Address),

    #[error("token {0} is already listed")]
    AlreadyListed(DeedId),

    #[error("invalid state: record is {current}, expected {expected}")]
    InvalidState { current: String, expected: String },

    #[error("price must be non-zero and consistent")]
    InvalidPrice,

    #[error("window duration must be non-zero")]
    InvalidWindow,

    #[error("lien accrual period must be non-zero")]
    InvalidPeriod,

    #[error("auction is closed to new bids")]
    AuctionClosed,

    #[error("the leading bidder cannot withdraw")]
    LeaderCannotWithdraw,

    #[error("only {sold} of {total} units have been purchased")]
    NotAllTokensPurchased { sold: u64, total: u64 },

    #[error("no units purchased by {0}")]
    NoTokensPurchased(Address),

    #[error("lien is denominated in {lien_token}, sale in {sale_token}")]
    LienTokenMismatch {
        lien_token: Address,
        sale_token: Address,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    // -- window ----------------------------------------------------------
    #[error("window closed at {window_end} (now {now})")]
    WindowClosed { now: Timestamp, window_end: Timestamp },

    #[error("window open until {window_end} (now {now})")]
    WindowStillOpen { now: Timestamp, window_end: Timestamp },

    // -- funds -----------------------------------------------------------
    #[error("proceeds {price} cannot cover lien {lien_balance} plus fee {fee}")]
    InsufficientFundsForLien {
        price: u64,
        lien_balance: u64,
        fee: u64,
    },

    #[error("lien still owes {remaining} after payoff")]
    LienUnsatisfied { remaining: u64 },

    #[error("bid {bid} is too low, minimum is {minimum}")]
    BidTooLow { bid: u64, minimum: u64 },

    #[error("requested {requested} units but only {available} remain")]
    ExceedsAvailableUnits { requested: u64, available: u64 },

    #[error("amount overflow")]
    AmountOverflow,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SettlementError {
    pub fn category(&self) -> ErrorCategory {
        use SettlementError::*;
        match self {
            IncorrectSignature
            | NotSeller(_)
            | NotBuyer(_)
            | NotDesignatedBuyer(_)
            | SellerCannotBid
            | AccessDenied(_)
            | TransferRestricted
            | NotListingManager(_) => ErrorCategory::Authorization,

            NotFound { .. }
            | UnknownLien(_)
            | AlreadyListed(_)
            | InvalidState { .. }
            | InvalidPrice
            | InvalidWindow
            | InvalidPeriod
            | AuctionClosed
            | LeaderCannotWithdraw
            | NotAllTokensPurchased { .. }
            | NoTokensPurchased(_)
            | LienTokenMismatch { .. }
            | Config(_) => ErrorCategory::State,

            WindowClosed { .. } | WindowStillOpen { .. } => ErrorCategory::Window,

            InsufficientFundsForLien { .. }
            | LienUnsatisfied { .. }
            | BidTooLow { .. }
            | ExceedsAvailableUnits { .. }
            | AmountOverflow => ErrorCategory::Funds,

            Ledger(inner) => ledger_category(inner),
        }
    }
}

fn ledger_category(err: &LedgerError) -> ErrorCategory {
    match err {
        LedgerError::InsufficientBalance { .. }
        | LedgerError::InsufficientAllowance { .. }
        | LedgerError::AmountOverflow => ErrorCategory::Funds,
        LedgerError::Unauthorized { .. }
        | LedgerError::NotDeedOwner { .. }
        | LedgerError::NotApproved { .. }
        | LedgerError::AlreadyAuthorized(_)
        | LedgerError::NotAuthorized(_) => ErrorCategory::Authorization,
        LedgerError::UnknownContract { .. }
        | LedgerError::DeedNotFound { .. }
        | LedgerError::AgreementTooLong { .. } => ErrorCategory::State,
    }
}

/// Fail with `WindowClosed` unless `now < window_end`.
pub(crate) fn require_open(now: Timestamp, window_end: Timestamp) -> Result<(), SettlementError> {
    if now < window_end {
        Ok(())
    } else {
        Err(SettlementError::WindowClosed { now, window_end })
    }
}

/// Fail with `WindowStillOpen` unless `now >= window_end`.
pub(crate) fn require_closed(now: Timestamp, window_end: Timestamp) -> Result<(), SettlementError> {
    if now >= window_end {
        Ok(())
    } else {
        Err(SettlementError::WindowStillOpen { now, window_end })
    }
}
