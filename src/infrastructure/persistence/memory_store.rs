//! In-memory implementation of the resource store.
//!
//! Writable scopes work on a private snapshot and keep a log of their writes; commit
//! replays the log against the live tables under a lock. A conditional update
//! that no longer affects the same number of rows at replay time means another
//! scope committed first, and the commit fails with [`AppError::Conflict`].

use async_trait::async_trait;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::store::{
    Direction, FieldUpdate, Filter, Page, Query, Record, ResourceStore, Row, Scope, Table,
    UnitOfWork, UpdateOp, Value, preload_into,
};
use crate::error::AppError;

type Tables = HashMap<Table, Vec<Row>>;

fn lock(live: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, AppError> {
    live.lock()
        .map_err(|_| AppError::internal("Memory store lock poisoned", json!({})))
}

/// Per-entity rules captured when a write is logged.
#[derive(Debug, Clone, Copy)]
struct Rules {
    table: Table,
    soft_delete: bool,
    unique_live: &'static [&'static str],
    non_negative: &'static [&'static str],
}

impl Rules {
    fn of<T: Record>() -> Self {
        Self {
            table: T::TABLE,
            soft_delete: T::SOFT_DELETE,
            unique_live: T::UNIQUE_LIVE,
            non_negative: T::NON_NEGATIVE,
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert {
        rules: Rules,
        row: Row,
    },
    Update {
        rules: Rules,
        updates: Vec<FieldUpdate>,
        query: Query,
        affected: u64,
    },
}

fn is_live(row: &Row) -> bool {
    row.get("deleted_at").is_none_or(Value::is_null)
}

fn cmp_column(row: &Row, column: &str, value: &Value) -> Option<Ordering> {
    row.get(column).and_then(|v| v.compare(value))
}

fn matches_filter(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(c, v) => cmp_column(row, c, v) == Some(Ordering::Equal),
        Filter::Gt(c, v) => cmp_column(row, c, v) == Some(Ordering::Greater),
        Filter::Gte(c, v) => matches!(
            cmp_column(row, c, v),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::Lt(c, v) => cmp_column(row, c, v) == Some(Ordering::Less),
        Filter::Lte(c, v) => matches!(
            cmp_column(row, c, v),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::IsNull(c) => row.get(c).is_none_or(Value::is_null),
        Filter::In(c, values) => values
            .iter()
            .any(|v| cmp_column(row, c, v) == Some(Ordering::Equal)),
        Filter::Contains(columns, term) => {
            let term = term.to_lowercase();
            columns.iter().any(|c| {
                row.get(c)
                    .and_then(Value::as_search_text)
                    .is_some_and(|text| text.to_lowercase().contains(&term))
            })
        }
    }
}

fn matches(row: &Row, query: &Query, soft_delete: bool) -> bool {
    if soft_delete && !query.includes_deleted() && !is_live(row) {
        return false;
    }
    query.filters().all(|f| matches_filter(row, f))
}

/// Matching rows in query order. Ties keep insertion order, reversed when the
/// first order clause is descending.
fn select<'a>(tables: &'a Tables, table: Table, query: &Query, soft_delete: bool) -> Vec<&'a Row> {
    let Some(rows) = tables.get(&table) else {
        return Vec::new();
    };

    let mut selected: Vec<(usize, &Row)> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| matches(row, query, soft_delete))
        .collect();

    let orders: Vec<_> = query.orders().collect();
    let newest_first = orders
        .first()
        .is_some_and(|o| o.direction == Direction::Desc);

    selected.sort_by(|(ia, a), (ib, b)| {
        for order in &orders {
            let ord = match (a.get(order.column), b.get(order.column)) {
                (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        if newest_first { ib.cmp(ia) } else { ia.cmp(ib) }
    });

    selected.into_iter().map(|(_, row)| row).collect()
}

fn decode<T: Record>(rows: &[&Row]) -> Result<Vec<T>, AppError> {
    rows.iter().map(|row| T::from_values(row)).collect()
}

fn check_violation(rules: &Rules, column: &str) -> AppError {
    AppError::bad_request(
        "Check constraint violation",
        json!({ "constraint": format!("{}_{}_check", rules.table.name(), column) }),
    )
}

fn apply_insert(tables: &mut Tables, rules: &Rules, row: &Row) -> Result<(), AppError> {
    let rows = tables.entry(rules.table).or_default();

    let id = row.get("id");
    if rows.iter().any(|r| r.get("id") == id) {
        return Err(AppError::conflict(
            "Unique constraint violation",
            json!({ "constraint": format!("{}_pkey", rules.table.name()) }),
        ));
    }

    for column in rules.unique_live {
        let value = row.get(column);
        let taken = rows
            .iter()
            .filter(|r| !rules.soft_delete || is_live(r))
            .any(|r| r.get(column) == value);
        if taken {
            return Err(AppError::conflict(
                "Unique constraint violation",
                json!({ "constraint": format!("{}_{}_live_key", rules.table.name(), column) }),
            ));
        }
    }

    for column in rules.non_negative {
        if row.get(column).is_some_and(is_negative) {
            return Err(check_violation(rules, column));
        }
    }

    rows.push(row.clone());
    Ok(())
}

fn is_negative(value: &Value) -> bool {
    match value {
        Value::Int(v) => *v < 0,
        Value::Decimal(v) => v.is_sign_negative() && !v.is_zero(),
        _ => false,
    }
}

fn apply_update(
    tables: &mut Tables,
    rules: &Rules,
    updates: &[FieldUpdate],
    query: &Query,
) -> Result<u64, AppError> {
    let Some(rows) = tables.get_mut(&rules.table) else {
        return Ok(0);
    };

    let mut changed = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        if !matches(row, query, rules.soft_delete) {
            continue;
        }

        let mut next = row.clone();
        for update in updates {
            let current = next.get(update.column).cloned().ok_or_else(|| {
                AppError::internal("Unknown column in update", json!({ "column": update.column }))
            })?;
            let value = match &update.op {
                UpdateOp::Set(v) => Some(v.clone()),
                UpdateOp::Add(v) => current.checked_add(v),
                UpdateOp::Subtract(v) => current.checked_sub(v),
            }
            .ok_or_else(|| {
                AppError::bad_request("Numeric field out of range", json!({ "column": update.column }))
            })?;

            if rules.non_negative.contains(&update.column) && is_negative(&value) {
                return Err(check_violation(rules, update.column));
            }
            next.insert(update.column, value);
        }
        changed.push((index, next));
    }

    let affected = changed.len() as u64;
    for (index, row) in changed {
        rows[index] = row;
    }
    Ok(affected)
}

/// Resource store over process memory. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    live: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A scope over [`MemoryStore`]. Dropping it uncommitted discards its writes.
pub struct MemoryScope {
    live: Arc<Mutex<Tables>>,
    snapshot: Option<Tables>,
    log: Vec<Op>,
    readonly: bool,
    committed: bool,
    closed: bool,
}

impl MemoryScope {
    fn ensure_open(&self) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::internal(
                "Scope is already closed",
                json!({ "committed": self.committed }),
            ));
        }
        Ok(())
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, AppError> {
        self.ensure_open()?;
        match &self.snapshot {
            Some(tables) => Ok(f(tables)),
            None => {
                let live = lock(&self.live)?;
                Ok(f(&live))
            }
        }
    }

    fn write(&mut self) -> Result<&mut Tables, AppError> {
        self.ensure_open()?;
        if self.readonly {
            return Err(AppError::bad_request(
                "Cannot write in a readonly scope",
                json!({}),
            ));
        }
        self.snapshot
            .as_mut()
            .ok_or_else(|| AppError::internal("Writable scope has no snapshot", json!({})))
    }
}

impl Drop for MemoryScope {
    fn drop(&mut self) {
        if !self.committed && !self.log.is_empty() {
            tracing::debug!(pending = self.log.len(), "discarding uncommitted scope");
        }
    }
}

#[async_trait]
impl Scope for MemoryScope {
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

        if !self.log.is_empty() {
            let mut live = lock(&self.live)?;
            let mut next = live.clone();

            for op in &self.log {
                match op {
                    Op::Insert { rules, row } => {
                        apply_insert(&mut next, rules, row).map_err(|e| match e {
                            AppError::Conflict { .. } => e,
                            other => conflict_on_replay(rules, other),
                        })?;
                    }
                    Op::Update {
                        rules,
                        updates,
                        query,
                        affected,
                    } => {
                        let replayed = apply_update(&mut next, rules, updates, query)
                            .map_err(|e| conflict_on_replay(rules, e))?;
                        if replayed != *affected {
                            return Err(AppError::conflict(
                                "Concurrent modification detected",
                                json!({
                                    "table": rules.table.name(),
                                    "expected": affected,
                                    "actual": replayed,
                                }),
                            ));
                        }
                    }
                }
            }

            *live = next;
        }

        self.snapshot = None;
        self.log.clear();
        self.committed = true;
        self.closed = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.snapshot = None;
        self.log.clear();
        self.closed = true;
        Ok(())
    }
}

fn conflict_on_replay(rules: &Rules, cause: AppError) -> AppError {
    AppError::conflict(
        "Concurrent modification detected",
        json!({ "table": rules.table.name(), "cause": cause.to_string() }),
    )
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    type Scope = MemoryScope;

    async fn begin(&self, readonly: bool) -> Result<MemoryScope, AppError> {
        let snapshot = if readonly {
            None
        } else {
            Some(lock(&self.live)?.clone())
        };

        Ok(MemoryScope {
            live: Arc::clone(&self.live),
            snapshot,
            log: Vec::new(),
            readonly,
            committed: false,
            closed: false,
        })
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn add<T: Record>(&self, scope: &mut MemoryScope, record: &T) -> Result<(), AppError> {
        let rules = Rules::of::<T>();
        let row = record.to_values();

        apply_insert(scope.write()?, &rules, &row)?;
        scope.log.push(Op::Insert { rules, row });
        Ok(())
    }

    async fn get_one<T: Record>(
        &self,
        scope: &mut MemoryScope,
        query: &Query,
    ) -> Result<Option<T>, AppError> {
        let first = scope.read(|tables| {
            select(tables, T::TABLE, query, T::SOFT_DELETE)
                .first()
                .map(|row| T::from_values(row))
        })?;

        let Some(record) = first.transpose()? else {
            return Ok(None);
        };

        let mut records = vec![record];
        preload_into(self, scope, &mut records, query).await?;
        Ok(records.pop())
    }

    async fn get_all<T: Record>(
        &self,
        scope: &mut MemoryScope,
        query: &Query,
    ) -> Result<Page<T>, AppError> {
        let pagination = query.pagination();

        let (items, total) = scope.read(|tables| {
            let rows = select(tables, T::TABLE, query, T::SOFT_DELETE);
            let total = rows.len() as i64;
            let window: Vec<&Row> = match pagination {
                Some(page) => rows
                    .into_iter()
                    .skip(page.offset() as usize)
                    .take(page.limit as usize)
                    .collect(),
                None => rows,
            };
            decode::<T>(&window).map(|items| (items, total))
        })??;

        let mut items = items;
        preload_into(self, scope, &mut items, query).await?;

        Ok(Page {
            items,
            total: pagination.map(|_| total),
        })
    }

    async fn count<T: Record>(&self, scope: &mut MemoryScope, query: &Query) -> Result<i64, AppError> {
        scope.read(|tables| select(tables, T::TABLE, query, T::SOFT_DELETE).len() as i64)
    }

    async fn update_fields<T: Record>(
        &self,
        scope: &mut MemoryScope,
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

        let rules = Rules::of::<T>();
        let affected = apply_update(scope.write()?, &rules, updates, query)?;
        scope.log.push(Op::Update {
            rules,
            updates: updates.to_vec(),
            query: query.clone(),
            affected,
        });
        Ok(affected)
    }
}
