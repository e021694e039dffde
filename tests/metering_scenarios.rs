mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use url_metering::prelude::*;

#[tokio::test]
async fn test_free_quota_and_visit_credits() {
    let (state, _) = common::configured_state(common::plan(3, 10, dec!(4.00), dec!(2.00))).await;
    let owner = common::funded_account(&state, Decimal::ZERO).await;

    let first = state
        .urls
        .create(&owner, "https://example.com/one")
        .await
        .unwrap();
    assert_eq!(first.remaining_visits, 10);
    state.urls.create(&owner, "https://example.com/two").await.unwrap();
    state.urls.create(&owner, "https://example.com/three").await.unwrap();

    let err = state
        .urls
        .create(&owner, "https://example.com/four")
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("maximum url creation limit is reached"));

    for _ in 0..10 {
        state.urls.redirect(&first.short_code).await.unwrap();
    }
    let err = state.urls.redirect(&first.short_code).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));

    let exhausted = state.urls.get(&owner, first.id).await.unwrap();
    assert_eq!(exhausted.remaining_visits, 0);
    assert_eq!(exhausted.state(), UrlState::Exhausted);
}

#[tokio::test]
async fn test_visit_renewal_beyond_balance_leaves_wallet() {
    let (state, _) = common::configured_state(common::plan(3, 10, dec!(4.00), dec!(2.00))).await;
    let owner = common::funded_account(&state, dec!(5.00)).await;
    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();

    let err = state.urls.renew_visits(&owner, url.id, 3).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { .. }));
    assert!(err.is_validation());

    assert_eq!(
        state.wallet.balance(&owner, owner.account_id).await.unwrap(),
        dec!(5.00)
    );
}

#[tokio::test]
async fn test_url_quota_purchase() {
    let (state, _) = common::configured_state(common::plan(3, 10, dec!(4.00), dec!(2.00))).await;
    let owner = common::funded_account(&state, dec!(10.00)).await;

    let account = state
        .wallet
        .renew_url_quota(&owner, owner.account_id, 2)
        .await
        .unwrap();
    assert_eq!(account.wallet_balance, dec!(2.00));
    assert_eq!(account.url_quota, 5);

    let entries = state
        .ledger
        .entries(&owner, owner.account_id, Pagination::default())
        .await
        .unwrap();
    let renewals: Vec<_> = entries
        .items
        .iter()
        .filter(|e| e.kind == LedgerKind::UrlRenewal)
        .collect();
    assert_eq!(renewals.len(), 1);
    assert_eq!(renewals[0].amount, dec!(8.00));
}

#[tokio::test]
async fn test_ledger_matches_balance() {
    let (state, _) = common::configured_state(common::plan(3, 10, dec!(1.50), dec!(0.25))).await;
    let owner = common::funded_account(&state, dec!(20.00)).await;
    let id = owner.account_id;

    state.wallet.debit(&owner, id, dec!(3.10)).await.unwrap();
    state.wallet.renew_url_quota(&owner, id, 2).await.unwrap();
    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();
    state.urls.renew_visits(&owner, url.id, 8).await.unwrap();
    state.wallet.credit(&owner, id, dec!(0.60)).await.unwrap();
    assert!(state.wallet.debit(&owner, id, dec!(1000)).await.is_err());

    let entries = state
        .ledger
        .entries(&owner, id, Pagination::new(100, 0))
        .await
        .unwrap();
    let net: Decimal = entries
        .items
        .iter()
        .map(|e| match e.kind {
            LedgerKind::Credit => e.amount,
            LedgerKind::AccountCreation => Decimal::ZERO,
            LedgerKind::Debit | LedgerKind::UrlRenewal | LedgerKind::VisitRenewal => -e.amount,
        })
        .sum();

    // creation, credit, debit, url renewal, visit renewal, credit
    assert_eq!(entries.total, Some(6));
    assert_eq!(net, dec!(12.50));
    assert_eq!(state.wallet.balance(&owner, id).await.unwrap(), net);
}

#[tokio::test]
async fn test_codes_unique_across_creates() {
    let (state, _) = common::configured_state(common::plan(40, 1, dec!(1), dec!(1))).await;
    let owner = common::funded_account(&state, Decimal::ZERO).await;

    let mut codes = HashSet::new();
    for i in 0..40 {
        let url = state
            .urls
            .create(&owner, &format!("https://example.com/{i}"))
            .await
            .unwrap();
        assert!(codes.insert(url.short_code));
    }
}

#[tokio::test]
async fn test_delete_is_not_repeatable() {
    let (state, admin) = common::configured_state(common::plan(3, 10, dec!(4), dec!(2))).await;
    let owner = common::funded_account(&state, Decimal::ZERO).await;
    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();

    state.urls.delete(&admin, url.id).await.unwrap();

    let err = state.urls.delete(&owner, url.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    let overview = state.wallet.overview(&owner, owner.account_id).await.unwrap();
    assert_eq!(overview.short_urls.map(|u| u.len()), Some(0));
}

#[tokio::test]
async fn test_repricing_applies_to_existing_urls() {
    let (state, admin) = common::configured_state(common::plan(3, 10, dec!(4), dec!(2))).await;
    let owner = common::funded_account(&state, dec!(10)).await;
    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();

    state
        .pricing
        .publish_plan(&admin, common::plan(3, 10, dec!(4), dec!(0.50)))
        .await
        .unwrap();
    state.urls.renew_visits(&owner, url.id, 4).await.unwrap();

    assert_eq!(
        state.wallet.balance(&owner, owner.account_id).await.unwrap(),
        dec!(8.00)
    );
}

#[tokio::test]
async fn test_empty_store_bootstrap() {
    let state = common::memory_state();

    let err = state.wallet.open_account().await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    let admin = state.wallet.create_admin(None).await.unwrap();
    let admin = Caller::admin(admin.id);
    state
        .pricing
        .set_initial_plan(&admin, common::plan(3, 10, dec!(4), dec!(2)))
        .await
        .unwrap();

    let account = state.wallet.open_account().await.unwrap();
    assert!(!account.is_admin);
    assert_eq!(account.url_quota, 3);

    let err = state.wallet.create_admin(None).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));
    let err = state
        .wallet
        .create_admin(Some(&Caller::admin(account.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_huge_visit_renewal_is_rejected() {
    let (state, _) =
        common::configured_state(common::plan(3, 10, dec!(4), dec!(100000000000.00))).await;
    let owner = common::funded_account(&state, dec!(10.00)).await;
    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();

    let err = state
        .urls
        .renew_visits(&owner, url.id, i64::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let stored = state.urls.get(&owner, url.id).await.unwrap();
    assert_eq!(stored.remaining_visits, 10);
    assert_eq!(
        state.wallet.balance(&owner, owner.account_id).await.unwrap(),
        dec!(10.00)
    );
}

#[tokio::test]
async fn test_sub_cent_amounts_never_reach_the_wallet() {
    let (state, _) = common::configured_state(common::plan(3, 10, dec!(4), dec!(2))).await;
    let owner = common::funded_account(&state, Decimal::ZERO).await;

    assert!(state.wallet.credit(&owner, owner.account_id, dec!(0.001)).await.is_err());
    assert!(state.wallet.debit(&owner, owner.account_id, dec!(0.0004)).await.is_err());

    let entries = state
        .ledger
        .entries(&owner, owner.account_id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(entries.total, Some(1));
    assert_eq!(
        state.wallet.balance(&owner, owner.account_id).await.unwrap(),
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_deleted_account_releases_codes_and_keeps_revenue() {
    let (state, admin) = common::configured_state(common::plan(3, 10, dec!(4), dec!(2))).await;
    let owner = common::funded_account(&state, dec!(10)).await;
    let url = state.urls.create(&owner, "https://example.com/").await.unwrap();
    state.urls.renew_visits(&owner, url.id, 2).await.unwrap();

    state
        .wallet
        .set_active(&admin, owner.account_id, false)
        .await
        .unwrap();
    let err = state.urls.renew_visits(&owner, url.id, 1).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));

    state.wallet.delete_account(&admin, owner.account_id).await.unwrap();
    let err = state.urls.redirect(&url.short_code).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    let year = chrono::Datelike::year(&chrono::Utc::now());
    let revenue: Decimal = state
        .ledger
        .monthly_revenue(&admin, year)
        .await
        .unwrap()
        .into_iter()
        .map(|(_, amount)| amount)
        .sum();
    assert_eq!(revenue, dec!(4.00));

    let report = state.ledger.report(&admin, year).await.unwrap();
    let accounts: i64 = report.iter().map(|m| m.new_accounts).sum();
    let urls: i64 = report.iter().map(|m| m.urls_created).sum();
    assert_eq!(accounts, 2);
    assert_eq!(urls, 1);
}
