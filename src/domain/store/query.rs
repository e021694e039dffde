//! Composable query specifications interpreted by store adapters.
//!
//! Callers describe *what* they want as an ordered list of [`Clause`]s; each
//! adapter decides how to execute it. No caller ever builds query text.

use super::value::Value;

/// Tables known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Accounts,
    ShortUrls,
    PricingPlans,
    LedgerEntries,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::ShortUrls => "short_urls",
            Table::PricingPlans => "pricing_plans",
            Table::LedgerEntries => "ledger_entries",
        }
    }
}

/// Row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    Gt(&'static str, Value),
    Gte(&'static str, Value),
    Lt(&'static str, Value),
    Lte(&'static str, Value),
    IsNull(&'static str),
    /// Column equals any of the values. An empty list matches nothing.
    In(&'static str, Vec<Value>),
    /// Case-insensitive substring match on any of the columns.
    Contains(Vec<&'static str>, String),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Eq(column, value.into())
    }

    pub fn gt(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Gt(column, value.into())
    }

    pub fn gte(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Gte(column, value.into())
    }

    pub fn lt(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Lt(column, value.into())
    }

    pub fn lte(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Lte(column, value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: &'static str,
    pub direction: Direction,
}

/// Page window. `page` is zero-based; the offset is `limit * page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub page: i64,
}

impl Pagination {
    pub fn new(limit: i64, page: i64) -> Self {
        Self {
            limit: limit.max(1),
            page: page.max(0),
        }
    }

    pub fn offset(&self) -> i64 {
        self.limit.saturating_mul(self.page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(20, 0)
    }
}

/// Associations that can be loaded alongside a parent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// Live short URLs owned by an account.
    ShortUrls,
    /// Ledger entries of an account, newest first.
    LedgerEntries,
}

impl Association {
    pub fn table(self) -> Table {
        match self {
            Association::ShortUrls => Table::ShortUrls,
            Association::LedgerEntries => Table::LedgerEntries,
        }
    }

    pub fn foreign_key(self) -> &'static str {
        match self {
            Association::ShortUrls => "owner_id",
            Association::LedgerEntries => "account_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Filter(Filter),
    Order(Order),
    Paginate(Pagination),
    Preload(Association),
    /// Lift the default exclusion of soft-deleted rows.
    IncludeDeleted,
}

/// Ordered list of clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single `id = ?` filter.
    pub fn by_id(id: uuid::Uuid) -> Self {
        Self::new().filter(Filter::eq("id", id))
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.clauses.push(Clause::Filter(filter));
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.clauses.push(Clause::Order(Order { column, direction }));
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.clauses.push(Clause::Paginate(pagination));
        self
    }

    pub fn preload(mut self, association: Association) -> Self {
        self.clauses.push(Clause::Preload(association));
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.clauses.push(Clause::IncludeDeleted);
        self
    }

    /// Appends another query's clauses after this one's.
    pub fn combine(mut self, other: Query) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Filter(f) => Some(f),
            _ => None,
        })
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Order(o) => Some(o),
            _ => None,
        })
    }

    pub fn preloads(&self) -> impl Iterator<Item = Association> + '_ {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Preload(a) => Some(*a),
            _ => None,
        })
    }

    /// Last pagination clause wins.
    pub fn pagination(&self) -> Option<Pagination> {
        self.clauses.iter().rev().find_map(|c| match c {
            Clause::Paginate(p) => Some(*p),
            _ => None,
        })
    }

    pub fn includes_deleted(&self) -> bool {
        self.clauses.iter().any(|c| matches!(c, Clause::IncludeDeleted))
    }
}

/// Result of a multi-row fetch. `total` is set when the query is paginated.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<i64>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// How a column changes in an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(Value),
    Add(Value),
    Subtract(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub column: &'static str,
    pub op: UpdateOp,
}

impl FieldUpdate {
    pub fn set(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: UpdateOp::Set(value.into()),
        }
    }

    pub fn add(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: UpdateOp::Add(value.into()),
        }
    }

    pub fn subtract(column: &'static str, value: impl Into<Value>) -> Self {
        Self {
            column,
            op: UpdateOp::Subtract(value.into()),
        }
    }
}
