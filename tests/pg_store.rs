//! PostgreSQL adapter tests. Run with `DATABASE_URL` set and `--ignored`.

use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::sync::Arc;
use url_metering::domain::entities::{Account, LedgerEntry};
use url_metering::domain::store::{FieldUpdate, Filter, Query};
use url_metering::prelude::*;

fn pg_state(pool: PgPool) -> AppState<PgStore> {
    AppState::new(
        Arc::new(PgStore::new(Arc::new(pool))),
        Arc::new(AcceptAllProbe),
        MeteringSettings::default(),
    )
}

async fn insert_admin(store: &PgStore) -> Caller {
    let admin = Account::new(0, true);
    let mut scope = store.begin(false).await.unwrap();
    store.add(&mut scope, &admin).await.unwrap();
    scope.commit().await.unwrap();
    Caller::admin(admin.id)
}

fn plan() -> NewPricingPlan {
    NewPricingPlan {
        free_url_quota: 3,
        free_visits_per_url: 2,
        price_per_url: dec!(4.00),
        price_per_visit: dec!(2.00),
    }
}

#[sqlx::test]
#[ignore]
async fn test_metering_flow(pool: PgPool) {
    let state = pg_state(pool);
    let admin = state.wallet.create_admin(None).await.unwrap();
    let admin = Caller::admin(admin.id);
    state.pricing.set_initial_plan(&admin, plan()).await.unwrap();

    let account = state.wallet.open_account().await.unwrap();
    let owner = Caller::account(account.id);
    let funded = state.wallet.credit(&owner, account.id, dec!(5.00)).await.unwrap();
    assert_eq!(funded.wallet_balance, dec!(5.00));

    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();
    state.urls.redirect(&url.short_code).await.unwrap();
    state.urls.redirect(&url.short_code).await.unwrap();
    assert!(matches!(
        state.urls.redirect(&url.short_code).await.unwrap_err(),
        AppError::Forbidden { .. }
    ));

    let err = state.urls.renew_visits(&owner, url.id, 3).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { .. }));
    let renewed = state.urls.renew_visits(&owner, url.id, 2).await.unwrap();
    assert_eq!(renewed.remaining_visits, 2);
    assert_eq!(
        state.wallet.balance(&owner, account.id).await.unwrap(),
        dec!(1.00)
    );

    state.urls.delete(&owner, url.id).await.unwrap();
    assert!(matches!(
        state.urls.delete(&owner, url.id).await.unwrap_err(),
        AppError::NotFound { .. }
    ));

    let overview = state.wallet.overview(&owner, account.id).await.unwrap();
    assert_eq!(overview.short_urls.map(|u| u.len()), Some(0));
    assert_eq!(overview.ledger_entries.map(|e| e.len()), Some(3));
}

#[sqlx::test]
#[ignore]
async fn test_live_code_is_unique(pool: PgPool) {
    let store = PgStore::new(Arc::new(pool));
    let admin = insert_admin(&store).await;

    let mut scope = store.begin(false).await.unwrap();
    let first = ShortUrl::new("https://a.example/".into(), "abcde".into(), 1, admin.account_id);
    store.add(&mut scope, &first).await.unwrap();
    scope.commit().await.unwrap();

    let mut scope = store.begin(false).await.unwrap();
    let clash = ShortUrl::new("https://b.example/".into(), "abcde".into(), 1, admin.account_id);
    let err = store.add(&mut scope, &clash).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));
    drop(scope);

    let mut scope = store.begin(false).await.unwrap();
    store
        .update_fields::<ShortUrl>(
            &mut scope,
            &[FieldUpdate::set(ShortUrl::DELETED_AT, Some(chrono::Utc::now()))],
            &Query::by_id(first.id),
        )
        .await
        .unwrap();
    store.add(&mut scope, &clash).await.unwrap();
    scope.commit().await.unwrap();
}

#[sqlx::test]
#[ignore]
async fn test_conditional_update_guards_balance(pool: PgPool) {
    let store = PgStore::new(Arc::new(pool));
    let caller = insert_admin(&store).await;

    let mut scope = store.begin(false).await.unwrap();
    let updated = store
        .update_fields::<Account>(
            &mut scope,
            &[FieldUpdate::subtract(Account::WALLET_BALANCE, dec!(1))],
            &Query::by_id(caller.account_id).filter(Filter::gte(Account::WALLET_BALANCE, dec!(1))),
        )
        .await
        .unwrap();
    assert_eq!(updated, 0);

    let err = store
        .update_fields::<LedgerEntry>(
            &mut scope,
            &[FieldUpdate::set(LedgerEntry::NOTE, "rewritten")],
            &Query::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[sqlx::test]
#[ignore]
async fn test_readonly_scope_rejects_writes(pool: PgPool) {
    let store = PgStore::new(Arc::new(pool));

    let mut scope = store.begin(true).await.unwrap();
    let err = store
        .add(&mut scope, &Account::new(0, false))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(
        store
            .count::<Account>(&mut scope, &Query::new())
            .await
            .unwrap(),
        0
    );
}

#[sqlx::test]
#[ignore]
async fn test_admin_lifecycle_and_report(pool: PgPool) {
    let state = pg_state(pool);
    let admin = state.wallet.create_admin(None).await.unwrap();
    let admin = Caller::admin(admin.id);
    assert!(matches!(
        state.wallet.create_admin(None).await.unwrap_err(),
        AppError::Unauthorized { .. }
    ));
    state.pricing.set_initial_plan(&admin, plan()).await.unwrap();

    let account = state.wallet.open_account().await.unwrap();
    let owner = Caller::account(account.id);
    state.wallet.credit(&owner, account.id, dec!(9.00)).await.unwrap();
    state.wallet.renew_url_quota(&owner, account.id, 1).await.unwrap();
    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();

    let dormant = state.wallet.set_active(&admin, account.id, false).await.unwrap();
    assert!(!dormant.is_active);
    state.wallet.delete_account(&admin, account.id).await.unwrap();
    assert!(matches!(
        state.urls.get(&admin, url.id).await.unwrap_err(),
        AppError::NotFound { .. }
    ));

    let year = chrono::Datelike::year(&chrono::Utc::now());
    let report = state.ledger.report(&admin, year).await.unwrap();
    let revenue: rust_decimal::Decimal = report.iter().map(|m| m.revenue).sum();
    assert_eq!(revenue, dec!(4.00));
    assert_eq!(report.iter().map(|m| m.new_accounts).sum::<i64>(), 2);
    assert_eq!(report.iter().map(|m| m.active_accounts).sum::<i64>(), 1);
}
