//! Translation of [`Query`] specifications into parameterised PostgreSQL.
//!
//! Identifiers come from entity constants; every value is bound, never
//! interpolated.

use sqlx::{Postgres, QueryBuilder};

use crate::domain::store::{Direction, FieldUpdate, Filter, Query, Record, Row, UpdateOp, Value};

pub(crate) type SqlBuilder = QueryBuilder<'static, Postgres>;

fn push_value(qb: &mut SqlBuilder, value: &Value) {
    match value.clone() {
        Value::Uuid(v) => qb.push_bind(v),
        Value::OptUuid(v) => qb.push_bind(v),
        Value::Text(v) => qb.push_bind(v),
        Value::Int(v) => qb.push_bind(v),
        Value::Decimal(v) => qb.push_bind(v),
        Value::Bool(v) => qb.push_bind(v),
        Value::Timestamp(v) => qb.push_bind(v),
        Value::OptTimestamp(v) => qb.push_bind(v),
    };
}

/// Escapes `LIKE` wildcards so the term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_filter(qb: &mut SqlBuilder, filter: &Filter) {
    match filter {
        Filter::Eq(column, value) => {
            qb.push(*column).push(" = ");
            push_value(qb, value);
        }
        Filter::Gt(column, value) => {
            qb.push(*column).push(" > ");
            push_value(qb, value);
        }
        Filter::Gte(column, value) => {
            qb.push(*column).push(" >= ");
            push_value(qb, value);
        }
        Filter::Lt(column, value) => {
            qb.push(*column).push(" < ");
            push_value(qb, value);
        }
        Filter::Lte(column, value) => {
            qb.push(*column).push(" <= ");
            push_value(qb, value);
        }
        Filter::IsNull(column) => {
            qb.push(*column).push(" IS NULL");
        }
        Filter::In(column, values) => {
            if values.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push(*column).push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, value);
            }
            qb.push(")");
        }
        Filter::Contains(columns, term) => {
            if columns.is_empty() {
                qb.push("TRUE");
                return;
            }
            let pattern = like_pattern(term);
            qb.push("(");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(*column).push(" ILIKE ");
                qb.push_bind(pattern.clone());
            }
            qb.push(")");
        }
    }
}

fn push_where<T: Record>(qb: &mut SqlBuilder, query: &Query) {
    let mut first = true;
    let mut next = |qb: &mut SqlBuilder| {
        qb.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    if T::SOFT_DELETE && !query.includes_deleted() {
        next(qb);
        qb.push("deleted_at IS NULL");
    }

    for filter in query.filters() {
        next(qb);
        push_filter(qb, filter);
    }
}

fn push_order(qb: &mut SqlBuilder, query: &Query) {
    for (i, order) in query.orders().enumerate() {
        qb.push(if i == 0 { " ORDER BY " } else { ", " });
        qb.push(order.column);
        qb.push(match order.direction {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        });
    }
}

/// `SELECT *` honouring filters, order and pagination.
pub(crate) fn select<T: Record>(query: &Query) -> SqlBuilder {
    let mut qb = SqlBuilder::new("SELECT * FROM ");
    qb.push(T::TABLE.name());
    push_where::<T>(&mut qb, query);
    push_order(&mut qb, query);

    if let Some(page) = query.pagination() {
        qb.push(" LIMIT ").push_bind(page.limit);
        qb.push(" OFFSET ").push_bind(page.offset());
    }

    qb
}

/// First row only; pagination clauses are ignored.
pub(crate) fn select_one<T: Record>(query: &Query) -> SqlBuilder {
    let mut qb = SqlBuilder::new("SELECT * FROM ");
    qb.push(T::TABLE.name());
    push_where::<T>(&mut qb, query);
    push_order(&mut qb, query);
    qb.push(" LIMIT 1");
    qb
}

/// `COUNT(*)` over the filters; order and pagination are ignored.
pub(crate) fn count<T: Record>(query: &Query) -> SqlBuilder {
    let mut qb = SqlBuilder::new("SELECT COUNT(*) FROM ");
    qb.push(T::TABLE.name());
    push_where::<T>(&mut qb, query);
    qb
}

pub(crate) fn insert<T: Record>(row: &Row) -> SqlBuilder {
    let mut qb = SqlBuilder::new("INSERT INTO ");
    qb.push(T::TABLE.name()).push(" (");
    for (i, column) in row.keys().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(*column);
    }
    qb.push(") VALUES (");
    for (i, value) in row.values().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(")");
    qb
}

pub(crate) fn update<T: Record>(updates: &[FieldUpdate], query: &Query) -> SqlBuilder {
    let mut qb = SqlBuilder::new("UPDATE ");
    qb.push(T::TABLE.name()).push(" SET ");
    for (i, update) in updates.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(update.column).push(" = ");
        match &update.op {
            UpdateOp::Set(value) => push_value(&mut qb, value),
            UpdateOp::Add(value) => {
                qb.push(update.column).push(" + ");
                push_value(&mut qb, value);
            }
            UpdateOp::Subtract(value) => {
                qb.push(update.column).push(" - ");
                push_value(&mut qb, value);
            }
        }
    }
    push_where::<T>(&mut qb, query);
    qb
}
