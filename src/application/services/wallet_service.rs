//! Account wallets and lifecycle: credits, debits, URL quota purchases and
//! admin account management.

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::guard::{active_account, require_admin, require_owner, require_viewer};
use super::{LedgerService, PricingService};
use crate::config::MeteringSettings;
use crate::domain::Caller;
use crate::domain::entities::{Account, LedgerKind, ShortUrl};
use crate::domain::store::{
    Association, Direction, FieldUpdate, Filter, Page, Pagination, Query, ResourceStore, Scope,
    UnitOfWork,
};
use crate::error::AppError;
use crate::utils::money::{MAX_AMOUNT, SCALE, fits_column};

pub(crate) const INSUFFICIENT_BALANCE: &str =
    "insufficient balance in wallet, please add money to wallet";

pub(crate) fn require_positive_amount(amount: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::bad_request(
            "amount must be greater than zero",
            json!({ "amount": amount.to_string() }),
        ));
    }
    if !fits_column(amount) {
        return Err(AppError::bad_request(
            format!("amount must have at most {SCALE} decimal places and not exceed {MAX_AMOUNT}"),
            json!({ "amount": amount.to_string() }),
        ));
    }
    Ok(())
}

pub(crate) fn require_positive_count(count: i64) -> Result<(), AppError> {
    if count <= 0 {
        return Err(AppError::bad_request(
            "count must be greater than zero",
            json!({ "count": count }),
        ));
    }
    Ok(())
}

/// Narrows an admin account listing. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountFilter {
    pub active: Option<bool>,
    pub admin: Option<bool>,
    pub include_deleted: bool,
}

impl AccountFilter {
    fn apply(self, mut query: Query) -> Query {
        if let Some(active) = self.active {
            query = query.filter(Filter::eq(Account::IS_ACTIVE, active));
        }
        if let Some(admin) = self.admin {
            query = query.filter(Filter::eq(Account::IS_ADMIN, admin));
        }
        if self.include_deleted {
            query = query.include_deleted();
        }
        query
    }
}

fn self_target(action: &str, account_id: Uuid) -> AppError {
    AppError::bad_request(
        format!("admins cannot {action} their own account"),
        json!({ "account_id": account_id }),
    )
}

/// Service for wallet balance and URL quota changes.
///
/// Every mutation is a conditional update whose predicate carries the
/// business rule (`balance >= amount`, `balance <= ceiling - amount`), plus
/// one ledger entry, committed together.
pub struct WalletService<S: ResourceStore> {
    store: Arc<S>,
    pricing: Arc<PricingService<S>>,
    ledger: Arc<LedgerService<S>>,
    settings: MeteringSettings,
}

impl<S: ResourceStore> WalletService<S> {
    pub fn new(
        store: Arc<S>,
        pricing: Arc<PricingService<S>>,
        ledger: Arc<LedgerService<S>>,
        settings: MeteringSettings,
    ) -> Self {
        Self {
            store,
            pricing,
            ledger,
            settings,
        }
    }

    async fn reload(&self, scope: &mut S::Scope, account_id: Uuid) -> Result<Account, AppError> {
        self.store
            .get_one::<Account>(scope, &Query::by_id(account_id))
            .await?
            .ok_or_else(|| AppError::not_found("account not found", json!({ "account_id": account_id })))
    }

    /// Creates a regular account seeded with the current plan's free URL quota.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if pricing is not configured.
    pub async fn open_account(&self) -> Result<Account, AppError> {
        let mut scope = self.store.begin(false).await?;
        let plan = self.pricing.current(&mut scope).await?;

        let account = Account::new(plan.free_url_quota, false);
        self.store.add(&mut scope, &account).await?;
        self.ledger
            .record(
                &mut scope,
                account.id,
                Decimal::ZERO,
                LedgerKind::AccountCreation,
                format!(
                    "First {} free urls added to account, with {} free visits per url",
                    plan.free_url_quota, plan.free_visits_per_url
                ),
            )
            .await?;
        scope.commit().await?;

        info!(account_id = %account.id, url_quota = account.url_quota, "account opened");
        Ok(account)
    }

    /// Creates an admin account. Admins need no pricing plan and start with
    /// no URL quota.
    ///
    /// Without a caller this only succeeds while the store holds no live admin,
    /// which is how a fresh installation gets its first one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unauthorized`] if an admin already exists and the
    /// caller is missing or is not an active admin.
    pub async fn create_admin(&self, caller: Option<&Caller>) -> Result<Account, AppError> {
        let mut scope = self.store.begin(false).await?;

        match caller {
            Some(caller) => {
                require_admin(self.store.as_ref(), &mut scope, caller).await?;
            }
            None => {
                let admins = self
                    .store
                    .count::<Account>(
                        &mut scope,
                        &Query::new().filter(Filter::eq(Account::IS_ADMIN, true)),
                    )
                    .await?;
                if admins > 0 {
                    return Err(AppError::unauthorized(
                        "admin privileges required",
                        json!({ "existing_admins": admins }),
                    ));
                }
            }
        }

        let account = Account::new(0, true);
        self.store.add(&mut scope, &account).await?;
        scope.commit().await?;

        info!(
            account_id = %account.id,
            created_by = ?caller.map(|c| c.account_id),
            "admin account created"
        );
        Ok(account)
    }

    /// Adds money to the caller's wallet.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if `amount` is not positive or the balance
    ///   would exceed the configured ceiling
    /// - [`AppError::Unauthorized`] if the caller does not own an active account
    pub async fn credit(
        &self,
        caller: &Caller,
        account_id: Uuid,
        amount: Decimal,
    ) -> Result<Account, AppError> {
        require_positive_amount(amount)?;
        require_owner(caller, account_id)?;

        let ceiling = self.settings.wallet_ceiling;
        let mut scope = self.store.begin(false).await?;
        active_account(self.store.as_ref(), &mut scope, account_id).await?;

        let over_ceiling = || {
            AppError::bad_request(
                format!("wallet balance cannot exceed {ceiling}"),
                json!({ "amount": amount.to_string(), "ceiling": ceiling.to_string() }),
            )
        };
        if amount > ceiling {
            return Err(over_ceiling());
        }

        let updated = self
            .store
            .update_fields::<Account>(
                &mut scope,
                &[FieldUpdate::add(Account::WALLET_BALANCE, amount)],
                &Query::by_id(account_id).filter(Filter::lte(Account::WALLET_BALANCE, ceiling - amount)),
            )
            .await?;
        if updated == 0 {
            warn!(account_id = %account_id, amount = %amount, "credit rejected by ceiling");
            return Err(over_ceiling());
        }

        self.ledger
            .record(
                &mut scope,
                account_id,
                amount,
                LedgerKind::Credit,
                format!("{amount:.2} added to wallet"),
            )
            .await?;
        let account = self.reload(&mut scope, account_id).await?;
        scope.commit().await?;

        info!(account_id = %account_id, amount = %amount, balance = %account.wallet_balance, "wallet credited");
        Ok(account)
    }

    /// Takes money from the caller's wallet.
    ///
    /// # Errors
    ///
    /// - [`AppError::InsufficientBalance`] if `amount` exceeds the balance
    /// - [`AppError::Validation`] if `amount` is not positive
    /// - [`AppError::Unauthorized`] if the caller does not own an active account
    pub async fn debit(
        &self,
        caller: &Caller,
        account_id: Uuid,
        amount: Decimal,
    ) -> Result<Account, AppError> {
        require_positive_amount(amount)?;
        require_owner(caller, account_id)?;

        let mut scope = self.store.begin(false).await?;
        let before = active_account(self.store.as_ref(), &mut scope, account_id).await?;

        let updated = self
            .store
            .update_fields::<Account>(
                &mut scope,
                &[FieldUpdate::subtract(Account::WALLET_BALANCE, amount)],
                &Query::by_id(account_id).filter(Filter::gte(Account::WALLET_BALANCE, amount)),
            )
            .await?;
        if updated == 0 {
            warn!(account_id = %account_id, amount = %amount, "debit rejected");
            return Err(AppError::insufficient_balance(
                INSUFFICIENT_BALANCE,
                json!({
                    "balance": before.wallet_balance.to_string(),
                    "amount": amount.to_string(),
                }),
            ));
        }

        self.ledger
            .record(
                &mut scope,
                account_id,
                amount,
                LedgerKind::Debit,
                format!("{amount:.2} taken from wallet"),
            )
            .await?;
        let account = self.reload(&mut scope, account_id).await?;
        scope.commit().await?;

        info!(account_id = %account_id, amount = %amount, balance = %account.wallet_balance, "wallet debited");
        Ok(account)
    }

    /// Buys `count` more URL creations at the current plan's price.
    ///
    /// # Errors
    ///
    /// - [`AppError::InsufficientBalance`] if the cost exceeds the balance
    /// - [`AppError::Validation`] if `count` is not positive
    /// - [`AppError::NotFound`] if pricing is not configured
    /// - [`AppError::Unauthorized`] if the caller does not own an active account
    pub async fn renew_url_quota(
        &self,
        caller: &Caller,
        account_id: Uuid,
        count: i64,
    ) -> Result<Account, AppError> {
        require_positive_count(count)?;
        require_owner(caller, account_id)?;

        let mut scope = self.store.begin(false).await?;
        let before = active_account(self.store.as_ref(), &mut scope, account_id).await?;
        let plan = self.pricing.current(&mut scope).await?;
        let cost = plan.url_cost(count)?;

        let updated = self
            .store
            .update_fields::<Account>(
                &mut scope,
                &[
                    FieldUpdate::subtract(Account::WALLET_BALANCE, cost),
                    FieldUpdate::add(Account::URL_QUOTA, count),
                ],
                &Query::by_id(account_id).filter(Filter::gte(Account::WALLET_BALANCE, cost)),
            )
            .await?;
        if updated == 0 {
            return Err(AppError::insufficient_balance(
                INSUFFICIENT_BALANCE,
                json!({
                    "balance": before.wallet_balance.to_string(),
                    "cost": cost.to_string(),
                }),
            ));
        }

        self.ledger
            .record(
                &mut scope,
                account_id,
                cost,
                LedgerKind::UrlRenewal,
                format!(
                    "{count} url renewed for {:.2} per url renewal price",
                    plan.price_per_url
                ),
            )
            .await?;
        let account = self.reload(&mut scope, account_id).await?;
        scope.commit().await?;

        info!(account_id = %account_id, count, cost = %cost, "url quota renewed");
        Ok(account)
    }

    pub async fn balance(&self, caller: &Caller, account_id: Uuid) -> Result<Decimal, AppError> {
        require_viewer(caller, account_id)?;

        let mut scope = self.store.begin(true).await?;
        Ok(self.reload(&mut scope, account_id).await?.wallet_balance)
    }

    /// Account with its live short URLs and ledger entries loaded.
    pub async fn overview(&self, caller: &Caller, account_id: Uuid) -> Result<Account, AppError> {
        require_viewer(caller, account_id)?;

        let mut scope = self.store.begin(true).await?;
        let query = Query::by_id(account_id)
            .preload(Association::ShortUrls)
            .preload(Association::LedgerEntries);

        self.store
            .get_one::<Account>(&mut scope, &query)
            .await?
            .ok_or_else(|| AppError::not_found("account not found", json!({ "account_id": account_id })))
    }

    /// Accounts newest first, with total count. Admin only.
    pub async fn accounts(
        &self,
        caller: &Caller,
        filter: AccountFilter,
        pagination: Pagination,
    ) -> Result<Page<Account>, AppError> {
        let mut scope = self.store.begin(true).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;

        let query = filter
            .apply(Query::new())
            .order_by(Account::CREATED_AT, Direction::Desc)
            .paginate(pagination);
        self.store.get_all(&mut scope, &query).await
    }

    /// Activates or deactivates an account. Deactivated accounts keep their
    /// data but can no longer move money or create URLs.
    ///
    /// # Errors
    ///
    /// - [`AppError::Unauthorized`] if the caller is not an active admin
    /// - [`AppError::Validation`] if an admin tries to deactivate themselves
    /// - [`AppError::NotFound`] if no live account has this id
    pub async fn set_active(
        &self,
        caller: &Caller,
        account_id: Uuid,
        active: bool,
    ) -> Result<Account, AppError> {
        let mut scope = self.store.begin(false).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;
        if !active && caller.is(account_id) {
            return Err(self_target("deactivate", account_id));
        }

        let updated = self
            .store
            .update_fields::<Account>(
                &mut scope,
                &[FieldUpdate::set(Account::IS_ACTIVE, active)],
                &Query::by_id(account_id),
            )
            .await?;
        if updated == 0 {
            return Err(AppError::not_found("account not found", json!({ "account_id": account_id })));
        }

        let account = self.reload(&mut scope, account_id).await?;
        scope.commit().await?;

        info!(account_id = %account_id, active, changed_by = %caller.account_id, "account activation changed");
        Ok(account)
    }

    /// Tombstones an account together with its live short URLs, whose codes
    /// become free again. Ledger entries are kept.
    ///
    /// # Errors
    ///
    /// - [`AppError::Unauthorized`] if the caller is not an active admin
    /// - [`AppError::Validation`] if an admin tries to delete themselves
    /// - [`AppError::NotFound`] if the account does not exist or is already deleted
    pub async fn delete_account(&self, caller: &Caller, account_id: Uuid) -> Result<(), AppError> {
        let mut scope = self.store.begin(false).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;
        if caller.is(account_id) {
            return Err(self_target("delete", account_id));
        }

        let now = Utc::now();
        let updated = self
            .store
            .update_fields::<Account>(
                &mut scope,
                &[
                    FieldUpdate::set(Account::DELETED_AT, Some(now)),
                    FieldUpdate::set(Account::DELETED_BY, Some(caller.account_id)),
                ],
                &Query::by_id(account_id),
            )
            .await?;
        if updated == 0 {
            return Err(AppError::not_found("account not found", json!({ "account_id": account_id })));
        }

        let urls = self
            .store
            .update_fields::<ShortUrl>(
                &mut scope,
                &[
                    FieldUpdate::set(ShortUrl::DELETED_AT, Some(now)),
                    FieldUpdate::set(ShortUrl::DELETED_BY, Some(caller.account_id)),
                ],
                &Query::new().filter(Filter::eq(ShortUrl::OWNER_ID, account_id)),
            )
            .await?;
        scope.commit().await?;

        info!(account_id = %account_id, deleted_by = %caller.account_id, urls, "account deleted");
        Ok(())
    }
}
