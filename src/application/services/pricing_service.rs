//! Subscription pricing: the append-only history of plans.

use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::guard::require_admin;
use crate::domain::Caller;
use crate::domain::entities::{NewPricingPlan, PricingPlan};
use crate::domain::store::{Direction, Page, Pagination, Query, ResourceStore, Scope, UnitOfWork};
use crate::error::AppError;

/// Service for reading and publishing pricing plans.
///
/// The most recently created plan is the current one. Every price lookup
/// resolves against it, including renewals of URLs created under older plans.
pub struct PricingService<S: ResourceStore> {
    store: Arc<S>,
}

impl<S: ResourceStore> PricingService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn newest_first() -> Query {
        Query::new().order_by(PricingPlan::CREATED_AT, Direction::Desc)
    }

    /// Current plan, read inside the caller's scope.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when no plan was ever published.
    pub async fn current(&self, scope: &mut S::Scope) -> Result<PricingPlan, AppError> {
        self.store
            .get_one::<PricingPlan>(scope, &Self::newest_first())
            .await?
            .ok_or_else(|| {
                AppError::not_found(
                    "pricing not configured, admin has not set subscription price yet",
                    json!({}),
                )
            })
    }

    /// Current plan in its own readonly scope.
    pub async fn current_plan(&self) -> Result<PricingPlan, AppError> {
        let mut scope = self.store.begin(true).await?;
        self.current(&mut scope).await
    }

    /// Publishes the first plan.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if the plan has negative values or a plan
    ///   already exists
    /// - [`AppError::Unauthorized`] if the caller is not an active admin
    pub async fn set_initial_plan(
        &self,
        caller: &Caller,
        new_plan: NewPricingPlan,
    ) -> Result<PricingPlan, AppError> {
        new_plan.validate()?;

        let mut scope = self.store.begin(false).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;

        let existing = self
            .store
            .count::<PricingPlan>(&mut scope, &Query::new())
            .await?;
        if existing > 0 {
            return Err(AppError::bad_request(
                "pricing already configured, publish a new plan",
                json!({ "plans": existing }),
            ));
        }

        let plan = PricingPlan::from_new(new_plan, Some(caller.account_id));
        self.store.add(&mut scope, &plan).await?;
        scope.commit().await?;

        info!(plan_id = %plan.id, admin = %caller.account_id, "initial pricing plan set");
        Ok(plan)
    }

    /// Appends a plan that becomes current immediately.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if the plan has negative values
    /// - [`AppError::Unauthorized`] if the caller is not an active admin
    pub async fn publish_plan(
        &self,
        caller: &Caller,
        new_plan: NewPricingPlan,
    ) -> Result<PricingPlan, AppError> {
        new_plan.validate()?;

        let mut scope = self.store.begin(false).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;

        let plan = PricingPlan::from_new(new_plan, Some(caller.account_id));
        self.store.add(&mut scope, &plan).await?;
        scope.commit().await?;

        info!(
            plan_id = %plan.id,
            admin = %caller.account_id,
            price_per_url = %plan.price_per_url,
            price_per_visit = %plan.price_per_visit,
            "pricing plan published"
        );
        Ok(plan)
    }

    /// All plans, newest first.
    pub async fn history(
        &self,
        caller: &Caller,
        pagination: Pagination,
    ) -> Result<Page<PricingPlan>, AppError> {
        let mut scope = self.store.begin(true).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;

        self.store
            .get_all(&mut scope, &Self::newest_first().paginate(pagination))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::{new_plan, seed_account, seed_admin};
    use crate::infrastructure::persistence::MemoryStore;
    use rust_decimal_macros::dec;

    fn service() -> (Arc<MemoryStore>, PricingService<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Arc::clone(&store), PricingService::new(store))
    }

    #[tokio::test]
    async fn test_current_without_plan_is_not_found() {
        let (_, service) = service();

        let err = service.current_plan().await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(err.to_string().contains("pricing not configured"));
    }

    #[tokio::test]
    async fn test_initial_plan_then_second_attempt_rejected() {
        let (store, service) = service();
        let admin = seed_admin(&store).await;
        let caller = Caller::admin(admin.id);

        let plan = service.set_initial_plan(&caller, new_plan()).await.unwrap();
        assert_eq!(plan.created_by, Some(admin.id));
        assert_eq!(service.current_plan().await.unwrap().id, plan.id);

        let err = service.set_initial_plan(&caller, new_plan()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_published_plan_becomes_current() {
        let (store, service) = service();
        let admin = seed_admin(&store).await;
        let caller = Caller::admin(admin.id);
        service.set_initial_plan(&caller, new_plan()).await.unwrap();

        let mut cheaper = new_plan();
        cheaper.price_per_visit = dec!(0.50);
        let published = service.publish_plan(&caller, cheaper).await.unwrap();

        let current = service.current_plan().await.unwrap();
        assert_eq!(current.id, published.id);
        assert_eq!(current.price_per_visit, dec!(0.50));

        let history = service
            .history(&caller, Pagination::new(10, 0))
            .await
            .unwrap();
        assert_eq!(history.total, Some(2));
        assert_eq!(history.items[0].id, published.id);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_publish() {
        let (store, service) = service();
        let user = seed_account(&store, dec!(0), 0).await;

        let err = service
            .publish_plan(&Caller::account(user.id), new_plan())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_admin_claim_checked_against_store() {
        let (store, service) = service();
        let user = seed_account(&store, dec!(0), 0).await;

        let err = service
            .publish_plan(&Caller::admin(user.id), new_plan())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_negative_price_rejected_before_store() {
        let (store, service) = service();
        let admin = seed_admin(&store).await;

        let mut plan = new_plan();
        plan.price_per_url = dec!(-1);
        let err = service
            .publish_plan(&Caller::admin(admin.id), plan)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(service.current_plan().await.is_err());
    }

    #[tokio::test]
    async fn test_sub_cent_price_rejected() {
        let (store, service) = service();
        let admin = seed_admin(&store).await;

        let mut plan = new_plan();
        plan.price_per_visit = dec!(0.001);
        let err = service
            .set_initial_plan(&Caller::admin(admin.id), plan)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(service.current_plan().await.is_err());
    }
}
