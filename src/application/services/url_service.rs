//! Short URL lifecycle: creation, metered redirects, renewal and deletion.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::guard::{active_account, require_admin, require_owner, require_viewer};
use super::short_code_allocator::ShortCodeAllocator;
use super::wallet_service::{INSUFFICIENT_BALANCE, require_positive_count};
use super::{LedgerService, PricingService};
use crate::config::MeteringSettings;
use crate::domain::Caller;
use crate::domain::entities::{Account, LedgerKind, ShortUrl};
use crate::domain::probe::UrlProbe;
use crate::domain::store::{
    Direction, FieldUpdate, Filter, Page, Pagination, Query, ResourceStore, Scope, UnitOfWork,
};
use crate::error::AppError;
use crate::utils::code_generator::is_valid_code;
use crate::utils::long_url::canonicalize;

const QUOTA_REACHED: &str =
    "maximum url creation limit is reached, purchase more for creating new url";
const VISITS_EXHAUSTED: &str = "visit limit reached for this url, renew visits to continue";

fn url_not_found(details: serde_json::Value) -> AppError {
    AppError::not_found("short url not found", details)
}

/// Service for short URLs and their visit credits.
///
/// # State machine
///
/// - **Active**: `remaining_visits > 0`; redirects decrement it
/// - **Exhausted**: `remaining_visits == 0`; redirects fail until renewed
/// - **Deleted**: tombstoned; invisible to every operation
pub struct UrlService<S: ResourceStore, P: UrlProbe + ?Sized> {
    store: Arc<S>,
    pricing: Arc<PricingService<S>>,
    ledger: Arc<LedgerService<S>>,
    allocator: ShortCodeAllocator<S>,
    probe: Arc<P>,
}

impl<S: ResourceStore, P: UrlProbe + ?Sized> UrlService<S, P> {
    pub fn new(
        store: Arc<S>,
        pricing: Arc<PricingService<S>>,
        ledger: Arc<LedgerService<S>>,
        probe: Arc<P>,
        settings: &MeteringSettings,
    ) -> Self {
        let allocator = ShortCodeAllocator::new(Arc::clone(&store), settings.short_code_max_attempts);
        Self {
            store,
            pricing,
            ledger,
            allocator,
            probe,
        }
    }

    /// Replaces the code allocator.
    pub fn with_allocator(mut self, allocator: ShortCodeAllocator<S>) -> Self {
        self.allocator = allocator;
        self
    }

    async fn load_live(&self, scope: &mut S::Scope, url_id: Uuid) -> Result<ShortUrl, AppError> {
        self.store
            .get_one::<ShortUrl>(scope, &Query::by_id(url_id))
            .await?
            .ok_or_else(|| url_not_found(json!({ "url_id": url_id })))
    }

    /// Shortens `long_url` for the caller.
    ///
    /// The URL is probed before the scope opens, so no transaction waits on
    /// the network.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if the URL is malformed, unreachable, already
    ///   registered by the caller, or the caller's quota is used up
    /// - [`AppError::NotFound`] if pricing is not configured
    /// - [`AppError::CapacityExhausted`] if no free code is found
    /// - [`AppError::Conflict`] if a concurrent scope claimed the same code
    pub async fn create(&self, caller: &Caller, long_url: &str) -> Result<ShortUrl, AppError> {
        let long_url = canonicalize(long_url)?;
        self.probe.check(&long_url).await?;

        let mut scope = self.store.begin(false).await?;
        let owner = active_account(self.store.as_ref(), &mut scope, caller.account_id).await?;

        let duplicates = self
            .store
            .count::<ShortUrl>(
                &mut scope,
                &Query::new()
                    .filter(Filter::eq(ShortUrl::OWNER_ID, owner.id))
                    .filter(Filter::eq(ShortUrl::LONG_URL, long_url.as_str())),
            )
            .await?;
        if duplicates > 0 {
            return Err(AppError::bad_request(
                "Requested URL is already registered",
                json!({ "long_url": long_url }),
            ));
        }

        let quota_reached = || AppError::bad_request(QUOTA_REACHED, json!({ "account_id": owner.id }));
        if owner.url_quota <= 0 {
            return Err(quota_reached());
        }

        let plan = self.pricing.current(&mut scope).await?;
        let code = self.allocator.allocate(&mut scope).await?;
        let url = ShortUrl::new(long_url, code, plan.free_visits_per_url, owner.id);
        self.store.add(&mut scope, &url).await?;

        let updated = self
            .store
            .update_fields::<Account>(
                &mut scope,
                &[FieldUpdate::subtract(Account::URL_QUOTA, 1i64)],
                &Query::by_id(owner.id).filter(Filter::gte(Account::URL_QUOTA, 1i64)),
            )
            .await?;
        if updated == 0 {
            return Err(quota_reached());
        }

        scope.commit().await?;

        info!(url_id = %url.id, code = %url.short_code, owner = %owner.id, "short url created");
        Ok(url)
    }

    /// Consumes one visit and returns the long URL.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if no live URL has this code
    /// - [`AppError::Forbidden`] if no visits remain
    pub async fn redirect(&self, code: &str) -> Result<String, AppError> {
        if !is_valid_code(code) {
            return Err(url_not_found(json!({ "code": code })));
        }

        let mut scope = self.store.begin(false).await?;
        let url = self
            .store
            .get_one::<ShortUrl>(
                &mut scope,
                &Query::new().filter(Filter::eq(ShortUrl::SHORT_CODE, code)),
            )
            .await?
            .ok_or_else(|| url_not_found(json!({ "code": code })))?;

        let exhausted = || {
            metrics::counter!("redirects_exhausted_total").increment(1);
            AppError::forbidden(VISITS_EXHAUSTED, json!({ "code": code }))
        };
        if url.remaining_visits <= 0 {
            return Err(exhausted());
        }

        let updated = self
            .store
            .update_fields::<ShortUrl>(
                &mut scope,
                &[
                    FieldUpdate::subtract(ShortUrl::REMAINING_VISITS, 1i64),
                    FieldUpdate::add(ShortUrl::VISIT_COUNT, 1i64),
                ],
                &Query::by_id(url.id).filter(Filter::gt(ShortUrl::REMAINING_VISITS, 0i64)),
            )
            .await?;
        if updated == 0 {
            return Err(exhausted());
        }

        scope.commit().await?;

        metrics::counter!("redirects_total").increment(1);
        debug!(code = %code, "redirect served");
        Ok(url.long_url)
    }

    /// Buys `count` more visits for one of the caller's URLs.
    ///
    /// # Errors
    ///
    /// - [`AppError::InsufficientBalance`] if the cost exceeds the owner's wallet
    /// - [`AppError::Validation`] if `count` is not positive
    /// - [`AppError::Unauthorized`] if the caller does not own the URL
    /// - [`AppError::NotFound`] if the URL does not exist or pricing is not configured
    pub async fn renew_visits(
        &self,
        caller: &Caller,
        url_id: Uuid,
        count: i64,
    ) -> Result<ShortUrl, AppError> {
        require_positive_count(count)?;

        let mut scope = self.store.begin(false).await?;
        let url = self.load_live(&mut scope, url_id).await?;
        require_owner(caller, url.owner_id)?;
        let owner = active_account(self.store.as_ref(), &mut scope, url.owner_id).await?;

        let plan = self.pricing.current(&mut scope).await?;
        let cost = plan.visit_cost(count)?;

        let charged = self
            .store
            .update_fields::<Account>(
                &mut scope,
                &[FieldUpdate::subtract(Account::WALLET_BALANCE, cost)],
                &Query::by_id(owner.id).filter(Filter::gte(Account::WALLET_BALANCE, cost)),
            )
            .await?;
        if charged == 0 {
            warn!(url_id = %url_id, cost = %cost, "visit renewal rejected");
            return Err(AppError::insufficient_balance(
                INSUFFICIENT_BALANCE,
                json!({
                    "balance": owner.wallet_balance.to_string(),
                    "cost": cost.to_string(),
                }),
            ));
        }

        let credited = self
            .store
            .update_fields::<ShortUrl>(
                &mut scope,
                &[FieldUpdate::add(ShortUrl::REMAINING_VISITS, count)],
                &Query::by_id(url.id),
            )
            .await?;
        if credited == 0 {
            return Err(url_not_found(json!({ "url_id": url_id })));
        }

        self.ledger
            .record(
                &mut scope,
                owner.id,
                cost,
                LedgerKind::VisitRenewal,
                format!(
                    "{count} visits renewed for {:.2} per visit price",
                    plan.price_per_visit
                ),
            )
            .await?;
        let renewed = self.load_live(&mut scope, url_id).await?;
        scope.commit().await?;

        info!(url_id = %url_id, count, cost = %cost, "visits renewed");
        Ok(renewed)
    }

    /// Tombstones a URL. Owners and admins may delete.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if the URL does not exist or is already deleted
    /// - [`AppError::Unauthorized`] if the caller is neither owner nor active admin
    pub async fn delete(&self, caller: &Caller, url_id: Uuid) -> Result<(), AppError> {
        let mut scope = self.store.begin(false).await?;
        let url = self.load_live(&mut scope, url_id).await?;

        if caller.is(url.owner_id) {
            active_account(self.store.as_ref(), &mut scope, caller.account_id).await?;
        } else {
            require_admin(self.store.as_ref(), &mut scope, caller).await?;
        }

        let updated = self
            .store
            .update_fields::<ShortUrl>(
                &mut scope,
                &[
                    FieldUpdate::set(ShortUrl::DELETED_AT, Some(Utc::now())),
                    FieldUpdate::set(ShortUrl::DELETED_BY, Some(caller.account_id)),
                ],
                &Query::by_id(url.id),
            )
            .await?;
        if updated == 0 {
            return Err(url_not_found(json!({ "url_id": url_id })));
        }

        scope.commit().await?;

        info!(url_id = %url_id, deleted_by = %caller.account_id, "short url deleted");
        Ok(())
    }

    pub async fn get(&self, caller: &Caller, url_id: Uuid) -> Result<ShortUrl, AppError> {
        let mut scope = self.store.begin(true).await?;
        let url = self.load_live(&mut scope, url_id).await?;
        require_viewer(caller, url.owner_id)?;
        Ok(url)
    }

    /// Live URLs of one owner, newest first, optionally filtered by a
    /// case-insensitive search over the long URL and the short code.
    pub async fn list(
        &self,
        caller: &Caller,
        owner_id: Uuid,
        search: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<ShortUrl>, AppError> {
        require_viewer(caller, owner_id)?;

        let mut query = Query::new().filter(Filter::eq(ShortUrl::OWNER_ID, owner_id));
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(Filter::Contains(
                vec![ShortUrl::LONG_URL, ShortUrl::SHORT_CODE],
                term.to_string(),
            ));
        }
        let query = query
            .order_by(ShortUrl::CREATED_AT, Direction::Desc)
            .paginate(pagination);

        let mut scope = self.store.begin(true).await?;
        self.store.get_all(&mut scope, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::short_code_allocator::CodeSource;
    use crate::application::services::test_support::{seed_account, seed_admin, seed_plan};
    use crate::domain::entities::UrlState;
    use crate::domain::probe::MockUrlProbe;
    use crate::infrastructure::persistence::MemoryStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: Arc<LedgerService<MemoryStore>>,
        urls: UrlService<MemoryStore, MockUrlProbe>,
    }

    fn accepting_probe() -> MockUrlProbe {
        let mut probe = MockUrlProbe::new();
        probe.expect_check().returning(|_| Ok(()));
        probe
    }

    async fn fixture(probe: MockUrlProbe) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        seed_plan(&store, 3, 10, dec!(4.00), dec!(2.00)).await;

        let pricing = Arc::new(PricingService::new(Arc::clone(&store)));
        let ledger = Arc::new(LedgerService::new(Arc::clone(&store)));
        let urls = UrlService::new(
            Arc::clone(&store),
            pricing,
            Arc::clone(&ledger),
            Arc::new(probe),
            &MeteringSettings::default(),
        );

        Fixture { store, ledger, urls }
    }

    async fn quota_of(store: &MemoryStore, id: Uuid) -> i64 {
        let mut scope = store.begin(true).await.unwrap();
        store
            .get_one::<Account>(&mut scope, &Query::by_id(id))
            .await
            .unwrap()
            .unwrap()
            .url_quota
    }

    #[tokio::test]
    async fn test_create_spends_quota_and_seeds_visits() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;

        let url = f
            .urls
            .create(&Caller::account(owner.id), "https://Example.com/page#top")
            .await
            .unwrap();

        assert_eq!(url.long_url, "https://example.com/page");
        assert_eq!(url.remaining_visits, 10);
        assert_eq!(url.state(), UrlState::Active);
        assert!(is_valid_code(&url.short_code));
        assert_eq!(quota_of(&f.store, owner.id).await, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_long_url() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;
        let caller = Caller::account(owner.id);

        f.urls.create(&caller, "https://example.com/a").await.unwrap();
        let err = f.urls.create(&caller, "HTTPS://EXAMPLE.COM/a").await.unwrap_err();

        assert_eq!(err.to_string(), "Requested URL is already registered");
        assert_eq!(quota_of(&f.store, owner.id).await, 2);
    }

    #[tokio::test]
    async fn test_create_without_quota() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 0).await;

        let err = f
            .urls
            .create(&Caller::account(owner.id), "https://example.com/")
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), QUOTA_REACHED);
    }

    #[tokio::test]
    async fn test_failed_probe_blocks_creation() {
        let mut probe = MockUrlProbe::new();
        probe.expect_check().times(1).returning(|_| {
            Err(AppError::bad_request(
                "request url not found, please provide a valid Long URL",
                json!({}),
            ))
        });
        let f = fixture(probe).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;

        let err = f
            .urls
            .create(&Caller::account(owner.id), "https://example.com/missing")
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(quota_of(&f.store, owner.id).await, 3);
    }

    #[tokio::test]
    async fn test_malformed_url_never_probed() {
        let mut probe = MockUrlProbe::new();
        probe.expect_check().never();
        let f = fixture(probe).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;

        let err = f
            .urls
            .create(&Caller::account(owner.id), "ftp://example.com/file")
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_exhausted_allocator_rolls_back() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;
        let caller = Caller::account(owner.id);

        let source: CodeSource = Arc::new(|| Ok("aaaaa".to_string()));
        let urls = f.urls.with_allocator(ShortCodeAllocator::with_source(
            Arc::clone(&f.store),
            3,
            source,
        ));
        urls.create(&caller, "https://example.com/1").await.unwrap();

        let err = urls.create(&caller, "https://example.com/2").await.unwrap_err();
        assert!(matches!(err, AppError::CapacityExhausted { .. }));
        assert_eq!(quota_of(&f.store, owner.id).await, 2);
    }

    #[tokio::test]
    async fn test_redirect_until_exhausted() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;
        let url = f
            .urls
            .create(&Caller::account(owner.id), "https://example.com/")
            .await
            .unwrap();

        for _ in 0..10 {
            assert_eq!(
                f.urls.redirect(&url.short_code).await.unwrap(),
                "https://example.com/"
            );
        }
        let err = f.urls.redirect(&url.short_code).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        let stored = f.urls.get(&Caller::account(owner.id), url.id).await.unwrap();
        assert_eq!(stored.remaining_visits, 0);
        assert_eq!(stored.visit_count, 10);
        assert_eq!(stored.state(), UrlState::Exhausted);
    }

    #[tokio::test]
    async fn test_redirect_unknown_or_malformed_code() {
        let f = fixture(accepting_probe()).await;

        assert!(matches!(
            f.urls.redirect("zzzzz").await.unwrap_err(),
            AppError::NotFound { .. }
        ));
        assert!(matches!(
            f.urls.redirect("../etc").await.unwrap_err(),
            AppError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_renew_visits_charges_owner() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(10.00), 3).await;
        let caller = Caller::account(owner.id);
        let url = f.urls.create(&caller, "https://example.com/").await.unwrap();

        let renewed = f.urls.renew_visits(&caller, url.id, 3).await.unwrap();
        assert_eq!(renewed.remaining_visits, 13);

        let entries = f
            .ledger
            .entries(&caller, owner.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.items[0].kind, LedgerKind::VisitRenewal);
        assert_eq!(entries.items[0].amount, dec!(6.00));
        assert_eq!(entries.items[0].note, "3 visits renewed for 2.00 per visit price");
    }

    #[tokio::test]
    async fn test_renew_visits_insufficient_balance() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(5.00), 3).await;
        let caller = Caller::account(owner.id);
        let url = f.urls.create(&caller, "https://example.com/").await.unwrap();

        let err = f.urls.renew_visits(&caller, url.id, 3).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));

        let stored = f.urls.get(&caller, url.id).await.unwrap();
        assert_eq!(stored.remaining_visits, 10);
    }

    #[tokio::test]
    async fn test_renew_visits_cost_out_of_range() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(10.00), 3).await;
        let caller = Caller::account(owner.id);
        let url = f.urls.create(&caller, "https://example.com/").await.unwrap();

        let err = f.urls.renew_visits(&caller, url.id, i64::MAX).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let stored = f.urls.get(&caller, url.id).await.unwrap();
        assert_eq!(stored.remaining_visits, 10);
        let entries = f
            .ledger
            .entries(&caller, owner.id, Pagination::default())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_renew_visits_requires_owner() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(10), 3).await;
        let admin = seed_admin(&f.store).await;
        let url = f
            .urls
            .create(&Caller::account(owner.id), "https://example.com/")
            .await
            .unwrap();

        let err = f
            .urls
            .renew_visits(&Caller::admin(admin.id), url.id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;
        let caller = Caller::account(owner.id);
        let url = f.urls.create(&caller, "https://example.com/").await.unwrap();

        f.urls.delete(&caller, url.id).await.unwrap();

        let err = f.urls.delete(&caller, url.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(matches!(
            f.urls.redirect(&url.short_code).await.unwrap_err(),
            AppError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_admin_delete_records_actor() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;
        let admin = seed_admin(&f.store).await;
        let url = f
            .urls
            .create(&Caller::account(owner.id), "https://example.com/")
            .await
            .unwrap();

        let stranger = seed_account(&f.store, dec!(0), 0).await;
        let err = f
            .urls
            .delete(&Caller::account(stranger.id), url.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));

        f.urls.delete(&Caller::admin(admin.id), url.id).await.unwrap();

        let mut scope = f.store.begin(true).await.unwrap();
        let tombstone: ShortUrl = f
            .store
            .get_one(&mut scope, &Query::by_id(url.id).include_deleted())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tombstone.deleted_by, Some(admin.id));
        assert_eq!(tombstone.state(), UrlState::Deleted);
    }

    #[tokio::test]
    async fn test_list_with_search() {
        let f = fixture(accepting_probe()).await;
        let owner = seed_account(&f.store, dec!(0), 3).await;
        let caller = Caller::account(owner.id);
        f.urls.create(&caller, "https://docs.rs/sqlx").await.unwrap();
        f.urls.create(&caller, "https://crates.io/").await.unwrap();

        let all = f
            .urls
            .list(&caller, owner.id, None, Pagination::default())
            .await
            .unwrap();
        assert_eq!(all.total, Some(2));
        assert_eq!(all.items[0].long_url, "https://crates.io/");

        let found = f
            .urls
            .list(&caller, owner.id, Some("SQLX"), Pagination::default())
            .await
            .unwrap();
        assert_eq!(found.total, Some(1));

        let other = seed_account(&f.store, dec!(0), 0).await;
        assert!(
            f.urls
                .list(&Caller::account(other.id), owner.id, None, Pagination::default())
                .await
                .is_err()
        );
    }
}
