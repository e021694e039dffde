//! PostgreSQL implementation of the resource store.

use async_trait::async_trait;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

use super::sql::{self, SqlBuilder};
use crate::domain::store::{
    FieldUpdate, Page, Query, Record, ResourceStore, Scope, UnitOfWork, preload_into,
};
use crate::error::AppError;

/// Resource store backed by a shared connection pool.
///
/// Writable scopes own one transaction each. Concurrent debits and quota
/// decrements are serialised by PostgreSQL row locks: a conditional
/// `UPDATE ... WHERE balance >= $n` re-evaluates its predicate after the lock
/// is granted, so the loser sees zero affected rows.
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A scope over [`PgStore`].
///
/// Dropping an uncommitted writable scope drops its transaction, which sqlx
/// rolls back on the connection's next use.
pub struct PgScope {
    pool: Arc<PgPool>,
    tx: Option<Transaction<'static, Postgres>>,
    readonly: bool,
    committed: bool,
    closed: bool,
}

impl PgScope {
    fn ensure_open(&self) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::internal(
                "Scope is already closed",
                json!({ "committed": self.committed }),
            ));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), AppError> {
        self.ensure_open()?;
        if self.readonly {
            return Err(AppError::bad_request(
                "Cannot write in a readonly scope",
                json!({}),
            ));
        }
        Ok(())
    }

    async fn fetch_all<T: Record>(&mut self, mut qb: SqlBuilder) -> Result<Vec<T>, AppError> {
        self.ensure_open()?;
        let query = qb.build_query_as::<T>();
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(self.pool.as_ref()).await?,
        };
        Ok(rows)
    }

    async fn fetch_optional<T: Record>(
        &mut self,
        mut qb: SqlBuilder,
    ) -> Result<Option<T>, AppError> {
        self.ensure_open()?;
        let query = qb.build_query_as::<T>();
        let row = match self.tx.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await?,
            None => query.fetch_optional(self.pool.as_ref()).await?,
        };
        Ok(row)
    }

    async fn fetch_count(&mut self, mut qb: SqlBuilder) -> Result<i64, AppError> {
        self.ensure_open()?;
        let query = qb.build_query_scalar::<i64>();
        let total = match self.tx.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await?,
            None => query.fetch_one(self.pool.as_ref()).await?,
        };
        Ok(total)
    }

    async fn execute(&mut self, mut qb: SqlBuilder) -> Result<u64, AppError> {
        self.ensure_writable()?;
        let Some(tx) = self.tx.as_mut() else {
            return Err(AppError::internal("Writable scope has no transaction", json!({})));
        };
        let result = qb.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Scope for PgScope {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        if self.committed {
            return Ok(());
        }
        self.ensure_open()?;

        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }

        self.committed = true;
        self.closed = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        self.closed = true;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgStore {
    type Scope = PgScope;

    async fn begin(&self, readonly: bool) -> Result<PgScope, AppError> {
        let tx = if readonly {
            None
        } else {
            Some(self.pool.begin().await?)
        };

        Ok(PgScope {
            pool: Arc::clone(&self.pool),
            tx,
            readonly,
            committed: false,
            closed: false,
        })
    }
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn add<T: Record>(&self, scope: &mut PgScope, record: &T) -> Result<(), AppError> {
        let qb = sql::insert::<T>(&record.to_values());
        scope.execute(qb).await?;
        Ok(())
    }

    async fn get_one<T: Record>(
        &self,
        scope: &mut PgScope,
        query: &Query,
    ) -> Result<Option<T>, AppError> {
        let Some(record) = scope.fetch_optional::<T>(sql::select_one::<T>(query)).await? else {
            return Ok(None);
        };

        let mut records = vec![record];
        preload_into(self, scope, &mut records, query).await?;
        Ok(records.pop())
    }

    async fn get_all<T: Record>(
        &self,
        scope: &mut PgScope,
        query: &Query,
    ) -> Result<Page<T>, AppError> {
        let mut items = scope.fetch_all::<T>(sql::select::<T>(query)).await?;
        preload_into(self, scope, &mut items, query).await?;

        let total = match query.pagination() {
            Some(_) => Some(scope.fetch_count(sql::count::<T>(query)).await?),
            None => None,
        };

        Ok(Page { items, total })
    }

    async fn count<T: Record>(&self, scope: &mut PgScope, query: &Query) -> Result<i64, AppError> {
        scope.fetch_count(sql::count::<T>(query)).await
    }

    async fn update_fields<T: Record>(
        &self,
        scope: &mut PgScope,
        updates: &[FieldUpdate],
        query: &Query,
    ) -> Result<u64, AppError> {
        if T::APPEND_ONLY {
            return Err(AppError::bad_request(
                "Records are append-only",
                json!({ "table": T::TABLE.name() }),
            ));
        }
        if updates.is_empty() {
            return Ok(0);
        }

        scope.execute(sql::update::<T>(updates, query)).await
    }
}
