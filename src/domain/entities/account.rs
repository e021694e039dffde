//! Account entity: wallet balance and URL-creation quota.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::entities::{LedgerEntry, ShortUrl};
use crate::domain::store::{Loaded, Record, Row, RowExt, Table, Value};
use crate::error::AppError;

/// A user account that owns short URLs and spends from a wallet.
///
/// Balance and quota change only through ledgered operations.
/// `short_urls` and `ledger_entries` are filled only when preloaded.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub wallet_balance: Decimal,
    pub url_quota: i64,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    #[sqlx(skip)]
    pub short_urls: Option<Vec<ShortUrl>>,
    #[sqlx(skip)]
    pub ledger_entries: Option<Vec<LedgerEntry>>,
}

impl Account {
    pub const ID: &'static str = "id";
    pub const WALLET_BALANCE: &'static str = "wallet_balance";
    pub const URL_QUOTA: &'static str = "url_quota";
    pub const IS_ADMIN: &'static str = "is_admin";
    pub const IS_ACTIVE: &'static str = "is_active";
    pub const CREATED_AT: &'static str = "created_at";
    pub const DELETED_AT: &'static str = "deleted_at";
    pub const DELETED_BY: &'static str = "deleted_by";

    /// Creates a fresh, active account with an empty wallet.
    pub fn new(url_quota: i64, is_admin: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_balance: Decimal::ZERO,
            url_quota,
            is_admin,
            is_active: true,
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
            short_urls: None,
            ledger_entries: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Record for Account {
    const TABLE: Table = Table::Accounts;
    const SOFT_DELETE: bool = true;

    const NON_NEGATIVE: &'static [&'static str] = &[Self::WALLET_BALANCE, Self::URL_QUOTA];

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Row {
        Row::from([
            (Self::ID, Value::from(self.id)),
            (Self::WALLET_BALANCE, Value::from(self.wallet_balance)),
            (Self::URL_QUOTA, Value::from(self.url_quota)),
            (Self::IS_ADMIN, Value::from(self.is_admin)),
            (Self::IS_ACTIVE, Value::from(self.is_active)),
            (Self::CREATED_AT, Value::from(self.created_at)),
            (Self::DELETED_AT, Value::from(self.deleted_at)),
            (Self::DELETED_BY, Value::from(self.deleted_by)),
        ])
    }

    fn from_values(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            id: row.uuid(Self::ID)?,
            wallet_balance: row.decimal(Self::WALLET_BALANCE)?,
            url_quota: row.int(Self::URL_QUOTA)?,
            is_admin: row.boolean(Self::IS_ADMIN)?,
            is_active: row.boolean(Self::IS_ACTIVE)?,
            created_at: row.timestamp(Self::CREATED_AT)?,
            deleted_at: row.opt_timestamp(Self::DELETED_AT)?,
            deleted_by: row.opt_uuid(Self::DELETED_BY)?,
            short_urls: None,
            ledger_entries: None,
        })
    }

    fn attach(&mut self, loaded: Loaded) {
        match loaded {
            Loaded::ShortUrls(urls) => self.short_urls = Some(urls),
            Loaded::LedgerEntries(entries) => self.ledger_entries = Some(entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_starts_empty() {
        let account = Account::new(3, false);

        assert_eq!(account.wallet_balance, Decimal::ZERO);
        assert_eq!(account.url_quota, 3);
        assert!(account.is_active);
        assert!(!account.is_admin);
        assert!(!account.is_deleted());
    }

    #[test]
    fn test_values_round_trip_drops_associations() {
        let mut account = Account::new(1, true);
        account.attach(Loaded::ShortUrls(Vec::new()));

        let rebuilt = Account::from_values(&account.to_values()).unwrap();

        assert_eq!(rebuilt.id, account.id);
        assert!(rebuilt.is_admin);
        assert!(rebuilt.short_urls.is_none());
    }
}
