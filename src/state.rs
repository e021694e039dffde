//! Service graph shared by the binary and integration tests.

use std::sync::Arc;

use crate::application::services::{LedgerService, PricingService, UrlService, WalletService};
use crate::config::MeteringSettings;
use crate::domain::probe::UrlProbe;
use crate::domain::store::ResourceStore;

/// All metering services wired over one store.
pub struct AppState<S: ResourceStore> {
    pub store: Arc<S>,
    pub pricing: Arc<PricingService<S>>,
    pub ledger: Arc<LedgerService<S>>,
    pub wallet: Arc<WalletService<S>>,
    pub urls: Arc<UrlService<S, dyn UrlProbe>>,
}

impl<S: ResourceStore> AppState<S> {
    pub fn new(store: Arc<S>, probe: Arc<dyn UrlProbe>, settings: MeteringSettings) -> Self {
        let pricing = Arc::new(PricingService::new(Arc::clone(&store)));
        let ledger = Arc::new(LedgerService::new(Arc::clone(&store)));
        let urls = Arc::new(UrlService::new(
            Arc::clone(&store),
            Arc::clone(&pricing),
            Arc::clone(&ledger),
            probe,
            &settings,
        ));
        let wallet = Arc::new(WalletService::new(
            Arc::clone(&store),
            Arc::clone(&pricing),
            Arc::clone(&ledger),
            settings,
        ));

        Self {
            store,
            pricing,
            ledger,
            wallet,
            urls,
        }
    }
}

impl<S: ResourceStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pricing: Arc::clone(&self.pricing),
            ledger: Arc::clone(&self.ledger),
            wallet: Arc::clone(&self.wallet),
            urls: Arc::clone(&self.urls),
        }
    }
}
