//! Metering services for the application layer.

pub(crate) mod guard;
pub mod ledger_service;
pub mod pricing_service;
pub mod short_code_allocator;
pub mod url_service;
pub mod wallet_service;

pub use ledger_service::{LedgerService, MonthlyReport};
pub use pricing_service::PricingService;
pub use short_code_allocator::{CodeSource, ShortCodeAllocator};
pub use url_service::UrlService;
pub use wallet_service::{AccountFilter, WalletService};
