#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use url_metering::domain::entities::{Account, NewPricingPlan};
use url_metering::domain::store::{Query, ResourceStore, UnitOfWork};
use url_metering::prelude::*;

pub fn memory_state() -> AppState<MemoryStore> {
    AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(AcceptAllProbe),
        MeteringSettings::default(),
    )
}

pub fn plan(free_urls: i64, free_visits: i64, per_url: Decimal, per_visit: Decimal) -> NewPricingPlan {
    NewPricingPlan {
        free_url_quota: free_urls,
        free_visits_per_url: free_visits,
        price_per_url: per_url,
        price_per_visit: per_visit,
    }
}

/// Bootstraps the first admin of an empty store.
pub async fn create_admin(state: &AppState<MemoryStore>) -> Caller {
    let admin = state.wallet.create_admin(None).await.unwrap();
    Caller::admin(admin.id)
}

/// Admin plus initial plan.
pub async fn configured_state(plan: NewPricingPlan) -> (AppState<MemoryStore>, Caller) {
    let state = memory_state();
    let admin = create_admin(&state).await;
    state.pricing.set_initial_plan(&admin, plan).await.unwrap();
    (state, admin)
}

/// Opens an account and funds it through a credit.
pub async fn funded_account(state: &AppState<MemoryStore>, amount: Decimal) -> Caller {
    let account = state.wallet.open_account().await.unwrap();
    let caller = Caller::account(account.id);
    if amount > Decimal::ZERO {
        state.wallet.credit(&caller, account.id, amount).await.unwrap();
    }
    caller
}

pub async fn load_account(store: &MemoryStore, id: uuid::Uuid) -> Account {
    let mut scope = store.begin(true).await.unwrap();
    store
        .get_one::<Account>(&mut scope, &Query::by_id(id))
        .await
        .unwrap()
        .unwrap()
}
