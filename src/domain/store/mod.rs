//! Persistence contracts consumed by the metering services.
//!
//! # Architecture
//!
//! - [`UnitOfWork`] opens a [`Scope`]: writable scopes map to one store
//!   transaction, readonly scopes run without one
//! - [`ResourceStore`] performs record operations inside a scope, driven by
//!   [`Query`] specifications
//! - Implementations live in `crate::infrastructure::persistence`
//!
//! # Scope lifecycle
//!
//! ```rust,ignore
//! let mut scope = store.begin(false).await?;
//! store.update_fields::<Account>(&mut scope, &updates, &query).await?;
//! ledger.record(&mut scope, account_id, amount, kind, note).await?;
//! scope.commit().await?;
//! ```
//!
//! Any `?` before `commit` drops the scope, which rolls the transaction back.
//! `commit` is idempotent and `rollback` is a no-op after commit or on a
//! readonly scope.

pub mod query;
pub mod value;

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::FromRow;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::domain::entities::{LedgerEntry, ShortUrl};
use crate::error::AppError;

pub use query::{
    Association, Clause, Direction, FieldUpdate, Filter, Order, Page, Pagination, Query, Table,
    UpdateOp,
};
pub use value::{Row, RowExt, Value};

/// Children fetched for a [`Association`].
#[derive(Debug, Clone)]
pub enum Loaded {
    ShortUrls(Vec<ShortUrl>),
    LedgerEntries(Vec<LedgerEntry>),
}

/// A persisted entity.
///
/// Rows decode from PostgreSQL through `FromRow` and from generic column maps
/// through [`Record::from_values`], so every adapter can serve every entity.
pub trait Record: for<'r> FromRow<'r, PgRow> + Clone + Send + Sync + Unpin + 'static {
    const TABLE: Table;

    /// Rows carry `deleted_at` and reads skip tombstones by default.
    const SOFT_DELETE: bool = false;

    /// Columns that must be unique among live rows.
    const UNIQUE_LIVE: &'static [&'static str] = &[];

    /// Rows can never be updated once written.
    const APPEND_ONLY: bool = false;

    /// Columns backed by a `CHECK (col >= 0)` constraint.
    const NON_NEGATIVE: &'static [&'static str] = &[];

    fn id(&self) -> Uuid;

    fn to_values(&self) -> Row;

    fn from_values(row: &Row) -> Result<Self, AppError>;

    /// Receives preloaded children. Entities without associations ignore them.
    fn attach(&mut self, _loaded: Loaded) {}
}

/// Transaction scope handed out by a [`UnitOfWork`].
#[async_trait]
pub trait Scope: Send {
    fn is_readonly(&self) -> bool;

    fn is_committed(&self) -> bool;

    /// Commits pending work. Calling it again after success does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] when the store detects that a write lost
    /// a race, [`AppError::Database`] on store failures.
    async fn commit(&mut self) -> Result<(), AppError>;

    /// Discards pending work. Safe to call unconditionally.
    async fn rollback(&mut self) -> Result<(), AppError>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Scope: Scope;

    /// Opens a scope. Writable scopes start a transaction.
    async fn begin(&self, readonly: bool) -> Result<Self::Scope, AppError>;
}

/// Record operations executed inside a scope.
#[async_trait]
pub trait ResourceStore: UnitOfWork {
    /// Inserts one record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] on a uniqueness violation and
    /// [`AppError::Validation`] when called on a readonly scope.
    async fn add<T: Record>(&self, scope: &mut Self::Scope, record: &T) -> Result<(), AppError>;

    /// First matching record, honouring order clauses.
    async fn get_one<T: Record>(
        &self,
        scope: &mut Self::Scope,
        query: &Query,
    ) -> Result<Option<T>, AppError>;

    /// All matching records. `total` is filled when the query is paginated.
    async fn get_all<T: Record>(
        &self,
        scope: &mut Self::Scope,
        query: &Query,
    ) -> Result<Page<T>, AppError>;

    async fn count<T: Record>(&self, scope: &mut Self::Scope, query: &Query)
    -> Result<i64, AppError>;

    /// Applies `updates` to every matching record and returns how many rows
    /// changed. Filters are evaluated atomically with the update, so a
    /// conditional filter such as `balance >= amount` guards the write.
    async fn update_fields<T: Record>(
        &self,
        scope: &mut Self::Scope,
        updates: &[FieldUpdate],
        query: &Query,
    ) -> Result<u64, AppError>;
}

fn group_by<C>(children: Vec<C>, key: impl Fn(&C) -> Uuid) -> HashMap<Uuid, Vec<C>> {
    let mut grouped: HashMap<Uuid, Vec<C>> = HashMap::new();
    for child in children {
        grouped.entry(key(&child)).or_default().push(child);
    }
    grouped
}

/// Loads the associations requested by `query` and attaches them to
/// `parents`. Children come newest first; tombstoned children are skipped.
pub async fn preload_into<S, T>(
    store: &S,
    scope: &mut S::Scope,
    parents: &mut [T],
    query: &Query,
) -> Result<(), AppError>
where
    S: ResourceStore,
    T: Record,
{
    if parents.is_empty() {
        return Ok(());
    }

    for association in query.preloads() {
        let ids = parents.iter().map(|p| Value::from(p.id())).collect();
        let children = Query::new()
            .filter(Filter::In(association.foreign_key(), ids))
            .order_by("created_at", Direction::Desc);

        match association {
            Association::ShortUrls => {
                let page = store.get_all::<ShortUrl>(scope, &children).await?;
                let mut grouped = group_by(page.items, |url| url.owner_id);
                for parent in parents.iter_mut() {
                    let urls = grouped.remove(&parent.id()).unwrap_or_default();
                    parent.attach(Loaded::ShortUrls(urls));
                }
            }
            Association::LedgerEntries => {
                let page = store.get_all::<LedgerEntry>(scope, &children).await?;
                let mut grouped = group_by(page.items, |entry| entry.account_id);
                for parent in parents.iter_mut() {
                    let entries = grouped.remove(&parent.id()).unwrap_or_default();
                    parent.attach(Loaded::LedgerEntries(entries));
                }
            }
        }
    }

    Ok(())
}
