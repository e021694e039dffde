//! Ledger entry entity: immutable record of a value movement.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::store::{Record, Row, RowExt, Table, Value};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    Credit,
    Debit,
    UrlRenewal,
    VisitRenewal,
    AccountCreation,
}

impl LedgerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerKind::Credit => "CREDIT",
            LedgerKind::Debit => "DEBIT",
            LedgerKind::UrlRenewal => "URL_RENEWAL",
            LedgerKind::VisitRenewal => "VISIT_RENEWAL",
            LedgerKind::AccountCreation => "ACCOUNT_CREATION",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ledger kind: {0}")]
pub struct UnknownLedgerKind(pub String);

impl FromStr for LedgerKind {
    type Err = UnknownLedgerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT" => Ok(LedgerKind::Credit),
            "DEBIT" => Ok(LedgerKind::Debit),
            "URL_RENEWAL" => Ok(LedgerKind::UrlRenewal),
            "VISIT_RENEWAL" => Ok(LedgerKind::VisitRenewal),
            "ACCOUNT_CREATION" => Ok(LedgerKind::AccountCreation),
            other => Err(UnknownLedgerKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for LedgerKind {
    type Error = UnknownLedgerKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One audit row. `amount` is a magnitude; `kind` carries the direction.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    #[sqlx(try_from = "String")]
    pub kind: LedgerKind,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub const ID: &'static str = "id";
    pub const ACCOUNT_ID: &'static str = "account_id";
    pub const AMOUNT: &'static str = "amount";
    pub const KIND: &'static str = "kind";
    pub const NOTE: &'static str = "note";
    pub const CREATED_AT: &'static str = "created_at";

    pub fn new(account_id: Uuid, amount: Decimal, kind: LedgerKind, note: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            kind,
            note,
            created_at: Utc::now(),
        }
    }
}

impl Record for LedgerEntry {
    const TABLE: Table = Table::LedgerEntries;
    const APPEND_ONLY: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Row {
        Row::from([
            (Self::ID, Value::from(self.id)),
            (Self::ACCOUNT_ID, Value::from(self.account_id)),
            (Self::AMOUNT, Value::from(self.amount)),
            (Self::KIND, Value::from(self.kind.as_str())),
            (Self::NOTE, Value::from(self.note.clone())),
            (Self::CREATED_AT, Value::from(self.created_at)),
        ])
    }

    fn from_values(row: &Row) -> Result<Self, AppError> {
        let kind = row.text(Self::KIND)?;
        let kind = kind.parse().map_err(|e: UnknownLedgerKind| {
            AppError::internal("Corrupt ledger row", json!({ "reason": e.to_string() }))
        })?;

        Ok(Self {
            id: row.uuid(Self::ID)?,
            account_id: row.uuid(Self::ACCOUNT_ID)?,
            amount: row.decimal(Self::AMOUNT)?,
            kind,
            note: row.text(Self::NOTE)?,
            created_at: row.timestamp(Self::CREATED_AT)?,
        })
    }
}
