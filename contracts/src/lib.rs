// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Parcel Settlement Contracts
//!
//! The contracts that move a property deed and its purchase price between
//! parties who do not trust each other:
//!
//! - **Escrow**: single-buyer sale against a signed agreement, with lien
//!   payoff out of the deed's reserve and then the proceeds.
//! - **Auction**: competitive bidding with deposits, instant refunds for
//!   outbid leaders, and an optional buy-now price.
//! - **Lien**: static and time-accruing third-party claims that must be
//!   settled on sale.
//! - **Fractional**: pooled purchase by KYC-verified buyers, minting
//!   restricted shares only once fully subscribed.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Wrapping arithmetic and
//!    money do not mix.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. A call either completes or leaves no trace. The record transition
//!    happens before any transfer, and a failed transfer rolls both back.
//! 4. Every public record is serializable (serde) for storage and receipts.

pub mod auction;
mod consent;
pub mod custody;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod fractional;
pub mod lien;

pub use auction::{AuctionContract, AuctionRecord, AuctionStatus, AuctionTerms};
pub use error::{ErrorCategory, SettlementError};
pub use escrow::{SaleRecord, SaleState, SaleTerms, SalesContract};
pub use fees::{FeeSplit, SettlementKind, SettlementReceipt};
pub use fractional::{FractionalListing, ListingId, ListingStatus, ListingTerms, ShareClass, TokenFactory};
pub use lien::{Lien, LienBook, LienTerms};
