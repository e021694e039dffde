//! Application layer services implementing the metering rules.
//!
//! Services open a unit-of-work scope, apply conditional updates through the
//! [`crate::domain::store::ResourceStore`] trait, append one ledger entry and
//! commit. Any early return drops the scope and rolls everything back.
//!
//! # Available Services
//!
//! - [`services::pricing_service::PricingService`] - Current plan and plan history
//! - [`services::wallet_service::WalletService`] - Wallet credit/debit and URL quota purchases
//! - [`services::url_service::UrlService`] - Short URL creation, redirects, renewal, deletion
//! - [`services::ledger_service::LedgerService`] - Append-only audit trail
//! - [`services::short_code_allocator::ShortCodeAllocator`] - Collision-checked codes

pub mod services;
