//! Core domain entities of the metering subsystem.
//!
//! # Entity Types
//!
//! - [`Account`] - Wallet balance and URL-creation quota
//! - [`ShortUrl`] - A shortened URL with its visit credits
//! - [`PricingPlan`] - Prices and free allowances; the newest plan is current
//! - [`LedgerEntry`] - Immutable audit record of a value movement
//!
//! Each entity declares its column names as associated constants and
//! implements [`crate::domain::store::Record`] so any store adapter can
//! persist it.

pub mod account;
pub mod ledger_entry;
pub mod pricing_plan;
pub mod short_url;

pub use account::Account;
pub use ledger_entry::{LedgerEntry, LedgerKind};
pub use pricing_plan::{NewPricingPlan, PricingPlan};
pub use short_url::{ShortUrl, UrlState};
