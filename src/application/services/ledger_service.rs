//! Append-only audit trail of value movements.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::guard::{require_admin, require_viewer};
use crate::domain::Caller;
use crate::domain::entities::{Account, LedgerEntry, LedgerKind, ShortUrl};
use crate::domain::store::{
    Direction, Filter, Page, Pagination, Query, ResourceStore, UnitOfWork, Value,
};
use crate::error::AppError;

/// Ledger kinds that count as revenue.
const REVENUE_KINDS: [LedgerKind; 2] = [LedgerKind::UrlRenewal, LedgerKind::VisitRenewal];

/// Activity and revenue of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReport {
    pub month: u32,
    pub new_accounts: i64,
    /// Accounts opened this month that are still active and not deleted.
    pub active_accounts: i64,
    pub urls_created: i64,
    pub renewals: i64,
    pub revenue: Decimal,
}

impl MonthlyReport {
    fn empty(month: u32) -> Self {
        Self {
            month,
            new_accounts: 0,
            active_accounts: 0,
            urls_created: 0,
            renewals: 0,
            revenue: Decimal::ZERO,
        }
    }
}

/// `[1 Jan year, 1 Jan year+1)` in UTC.
fn year_bounds(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let start = |y: i32| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).single();
    year.checked_add(1)
        .and_then(|next| start(year).zip(start(next)))
        .ok_or_else(|| AppError::bad_request("year is out of range", json!({ "year": year })))
}

fn in_year(column: &'static str, from: DateTime<Utc>, to: DateTime<Utc>) -> Query {
    Query::new()
        .filter(Filter::gte(column, from))
        .filter(Filter::lt(column, to))
}

/// Twelve months, January first.
fn months() -> Vec<MonthlyReport> {
    (1..=12).map(MonthlyReport::empty).collect()
}

fn slot(report: &mut [MonthlyReport], at: DateTime<Utc>) -> &mut MonthlyReport {
    &mut report[at.month0() as usize]
}

/// Service for writing and reading ledger entries.
///
/// [`LedgerService::record`] always runs inside a scope owned by another
/// service so the entry commits or rolls back together with the balance
/// change it describes.
pub struct LedgerService<S: ResourceStore> {
    store: Arc<S>,
}

impl<S: ResourceStore> LedgerService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Appends one entry inside `scope`. Never commits.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if `amount` is negative
    /// - [`AppError::NotFound`] if the account does not exist
    pub async fn record(
        &self,
        scope: &mut S::Scope,
        account_id: Uuid,
        amount: Decimal,
        kind: LedgerKind,
        note: String,
    ) -> Result<LedgerEntry, AppError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(AppError::bad_request(
                "ledger amount must not be negative",
                json!({ "amount": amount.to_string() }),
            ));
        }

        let exists = self
            .store
            .count::<Account>(scope, &Query::by_id(account_id).include_deleted())
            .await?;
        if exists == 0 {
            return Err(AppError::not_found(
                "account not found",
                json!({ "account_id": account_id }),
            ));
        }

        let entry = LedgerEntry::new(account_id, amount, kind, note);
        self.store.add(scope, &entry).await?;

        metrics::counter!("ledger_entries_total", "kind" => kind.as_str()).increment(1);
        debug!(entry_id = %entry.id, account_id = %account_id, kind = %kind, "ledger entry recorded");

        Ok(entry)
    }

    /// Entries of one account, newest first.
    pub async fn entries(
        &self,
        caller: &Caller,
        account_id: Uuid,
        pagination: Pagination,
    ) -> Result<Page<LedgerEntry>, AppError> {
        require_viewer(caller, account_id)?;

        let mut scope = self.store.begin(true).await?;
        let query = Query::new()
            .filter(Filter::eq(LedgerEntry::ACCOUNT_ID, account_id))
            .order_by(LedgerEntry::CREATED_AT, Direction::Desc)
            .paginate(pagination);

        self.store.get_all(&mut scope, &query).await
    }

    async fn renewals(
        &self,
        scope: &mut S::Scope,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let kinds = REVENUE_KINDS.iter().map(|k| Value::from(k.as_str())).collect();
        let query = in_year(LedgerEntry::CREATED_AT, from, to)
            .filter(Filter::In(LedgerEntry::KIND, kinds));
        Ok(self.store.get_all(scope, &query).await?.items)
    }

    /// Renewal revenue per month of `year`. Admin only.
    pub async fn monthly_revenue(
        &self,
        caller: &Caller,
        year: i32,
    ) -> Result<Vec<(u32, Decimal)>, AppError> {
        let (from, to) = year_bounds(year)?;
        let mut scope = self.store.begin(true).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;

        let mut revenue = [Decimal::ZERO; 12];
        for entry in self.renewals(&mut scope, from, to).await? {
            revenue[entry.created_at.month0() as usize] += entry.amount;
        }

        Ok((1..=12).zip(revenue).collect())
    }

    /// Per-month accounts opened, URLs created, renewals and revenue for
    /// `year`. Deleted accounts and URLs still count toward the month they
    /// were created in. Admin only.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if `year` cannot be represented
    /// - [`AppError::Unauthorized`] if the caller is not an active admin
    pub async fn report(&self, caller: &Caller, year: i32) -> Result<Vec<MonthlyReport>, AppError> {
        let (from, to) = year_bounds(year)?;
        let mut scope = self.store.begin(true).await?;
        require_admin(self.store.as_ref(), &mut scope, caller).await?;

        let mut report = months();

        let accounts: Page<Account> = self
            .store
            .get_all(
                &mut scope,
                &in_year(Account::CREATED_AT, from, to).include_deleted(),
            )
            .await?;
        for account in accounts.items {
            let month = slot(&mut report, account.created_at);
            month.new_accounts += 1;
            if account.is_active && !account.is_deleted() {
                month.active_accounts += 1;
            }
        }

        let urls: Page<ShortUrl> = self
            .store
            .get_all(
                &mut scope,
                &in_year(ShortUrl::CREATED_AT, from, to).include_deleted(),
            )
            .await?;
        for url in urls.items {
            slot(&mut report, url.created_at).urls_created += 1;
        }

        for entry in self.renewals(&mut scope, from, to).await? {
            let month = slot(&mut report, entry.created_at);
            month.renewals += 1;
            month.revenue += entry.amount;
        }

        debug!(year, "monthly report built");
        Ok(report)
    }
}
