//! Short URL entity with its visit credits.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::store::{Record, Row, RowExt, Table, Value};
use crate::error::AppError;

/// Lifecycle state derived from a [`ShortUrl`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlState {
    /// Visits remain.
    Active,
    /// No visits left until renewed.
    Exhausted,
    /// Tombstoned.
    Deleted,
}

/// A shortened URL mapping owned by an account.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ShortUrl {
    pub id: Uuid,
    pub long_url: String,
    pub short_code: String,
    pub remaining_visits: i64,
    pub visit_count: i64,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl ShortUrl {
    pub const ID: &'static str = "id";
    pub const LONG_URL: &'static str = "long_url";
    pub const SHORT_CODE: &'static str = "short_code";
    pub const REMAINING_VISITS: &'static str = "remaining_visits";
    pub const VISIT_COUNT: &'static str = "visit_count";
    pub const OWNER_ID: &'static str = "owner_id";
    pub const CREATED_AT: &'static str = "created_at";
    pub const DELETED_AT: &'static str = "deleted_at";
    pub const DELETED_BY: &'static str = "deleted_by";

    pub fn new(long_url: String, short_code: String, remaining_visits: i64, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            long_url,
            short_code,
            remaining_visits,
            visit_count: 0,
            owner_id,
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn state(&self) -> UrlState {
        if self.deleted_at.is_some() {
            UrlState::Deleted
        } else if self.remaining_visits > 0 {
            UrlState::Active
        } else {
            UrlState::Exhausted
        }
    }
}

impl Record for ShortUrl {
    const TABLE: Table = Table::ShortUrls;
    const SOFT_DELETE: bool = true;
    const UNIQUE_LIVE: &'static [&'static str] = &[Self::SHORT_CODE];

    const NON_NEGATIVE: &'static [&'static str] = &[Self::REMAINING_VISITS, Self::VISIT_COUNT];

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Row {
        Row::from([
            (Self::ID, Value::from(self.id)),
            (Self::LONG_URL, Value::from(self.long_url.clone())),
            (Self::SHORT_CODE, Value::from(self.short_code.clone())),
            (Self::REMAINING_VISITS, Value::from(self.remaining_visits)),
            (Self::VISIT_COUNT, Value::from(self.visit_count)),
            (Self::OWNER_ID, Value::from(self.owner_id)),
            (Self::CREATED_AT, Value::from(self.created_at)),
            (Self::DELETED_AT, Value::from(self.deleted_at)),
            (Self::DELETED_BY, Value::from(self.deleted_by)),
        ])
    }

    fn from_values(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            id: row.uuid(Self::ID)?,
            long_url: row.text(Self::LONG_URL)?,
            short_code: row.text(Self::SHORT_CODE)?,
            remaining_visits: row.int(Self::REMAINING_VISITS)?,
            visit_count: row.int(Self::VISIT_COUNT)?,
            owner_id: row.uuid(Self::OWNER_ID)?,
            created_at: row.timestamp(Self::CREATED_AT)?,
            deleted_at: row.opt_timestamp(Self::DELETED_AT)?,
            deleted_by: row.opt_uuid(Self::DELETED_BY)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_url(remaining_visits: i64) -> ShortUrl {
        ShortUrl::new(
            "https://example.com/".to_string(),
            "aB3xZ".to_string(),
            remaining_visits,
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_state_follows_remaining_visits() {
        assert_eq!(create_test_url(10).state(), UrlState::Active);
        assert_eq!(create_test_url(0).state(), UrlState::Exhausted);
    }

    #[test]
    fn test_state_deleted_wins() {
        let mut url = create_test_url(10);
        url.deleted_at = Some(Utc::now());
        assert_eq!(url.state(), UrlState::Deleted);
    }

    #[test]
    fn test_new_url_has_no_visits_recorded() {
        let url = create_test_url(5);
        assert_eq!(url.visit_count, 0);
        assert_eq!(url.short_code, "aB3xZ");
    }
}
