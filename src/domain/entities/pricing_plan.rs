//! Pricing plan entity. Plans are append-only; the newest row is current.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::store::{Record, Row, RowExt, Table, Value};
use crate::error::AppError;
use crate::utils::money::{checked_cost, fits_column};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PricingPlan {
    pub id: Uuid,
    pub free_url_quota: i64,
    pub free_visits_per_url: i64,
    pub price_per_url: Decimal,
    pub price_per_visit: Decimal,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

impl PricingPlan {
    pub const ID: &'static str = "id";
    pub const FREE_URL_QUOTA: &'static str = "free_url_quota";
    pub const FREE_VISITS_PER_URL: &'static str = "free_visits_per_url";
    pub const PRICE_PER_URL: &'static str = "price_per_url";
    pub const PRICE_PER_VISIT: &'static str = "price_per_visit";
    pub const CREATED_AT: &'static str = "created_at";
    pub const CREATED_BY: &'static str = "created_by";

    pub fn from_new(new_plan: NewPricingPlan, created_by: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            free_url_quota: new_plan.free_url_quota,
            free_visits_per_url: new_plan.free_visits_per_url,
            price_per_url: new_plan.price_per_url,
            price_per_visit: new_plan.price_per_visit,
            created_at: Utc::now(),
            created_by,
        }
    }

    /// Cost of `count` additional URLs.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] when the cost does not fit a wallet.
    pub fn url_cost(&self, count: i64) -> Result<Decimal, AppError> {
        cost(count, self.price_per_url)
    }

    /// Cost of `count` additional visits.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] when the cost does not fit a wallet.
    pub fn visit_cost(&self, count: i64) -> Result<Decimal, AppError> {
        cost(count, self.price_per_visit)
    }
}

fn cost(count: i64, unit_price: Decimal) -> Result<Decimal, AppError> {
    checked_cost(count, unit_price).ok_or_else(|| {
        AppError::bad_request(
            "renewal cost is out of range",
            json!({ "count": count, "unit_price": unit_price.to_string() }),
        )
    })
}

fn price(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_price"));
    }
    if !fits_column(*value) {
        return Err(ValidationError::new("price_out_of_range"));
    }
    Ok(())
}

/// Input for publishing a plan.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPricingPlan {
    #[validate(range(min = 0))]
    pub free_url_quota: i64,
    #[validate(range(min = 0))]
    pub free_visits_per_url: i64,
    #[validate(custom(function = "price"))]
    pub price_per_url: Decimal,
    #[validate(custom(function = "price"))]
    pub price_per_visit: Decimal,
}

impl Record for PricingPlan {
    const TABLE: Table = Table::PricingPlans;
    const APPEND_ONLY: bool = true;

    fn id(&self) -> Uuid {
        self.id
    }

    fn to_values(&self) -> Row {
        Row::from([
            (Self::ID, Value::from(self.id)),
            (Self::FREE_URL_QUOTA, Value::from(self.free_url_quota)),
            (Self::FREE_VISITS_PER_URL, Value::from(self.free_visits_per_url)),
            (Self::PRICE_PER_URL, Value::from(self.price_per_url)),
            (Self::PRICE_PER_VISIT, Value::from(self.price_per_visit)),
            (Self::CREATED_AT, Value::from(self.created_at)),
            (Self::CREATED_BY, Value::from(self.created_by)),
        ])
    }

    fn from_values(row: &Row) -> Result<Self, AppError> {
        Ok(Self {
            id: row.uuid(Self::ID)?,
            free_url_quota: row.int(Self::FREE_URL_QUOTA)?,
            free_visits_per_url: row.int(Self::FREE_VISITS_PER_URL)?,
            price_per_url: row.decimal(Self::PRICE_PER_URL)?,
            price_per_visit: row.decimal(Self::PRICE_PER_VISIT)?,
            created_at: row.timestamp(Self::CREATED_AT)?,
            created_by: row.opt_uuid(Self::CREATED_BY)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_plan() -> NewPricingPlan {
        NewPricingPlan {
            free_url_quota: 3,
            free_visits_per_url: 10,
            price_per_url: dec!(4.00),
            price_per_visit: dec!(2.00),
        }
    }

    #[test]
    fn test_costs() {
        let plan = PricingPlan::from_new(new_plan(), None);
        assert_eq!(plan.url_cost(2).unwrap(), dec!(8.00));
        assert_eq!(plan.visit_cost(3).unwrap(), dec!(6.00));
    }

    #[test]
    fn test_cost_overflow_is_a_validation_error() {
        let mut input = new_plan();
        input.price_per_visit = dec!(100000000000.00);
        let plan = PricingPlan::from_new(input, None);

        assert!(plan.visit_cost(i64::MAX).unwrap_err().is_validation());
        assert!(plan.url_cost(i64::MAX).unwrap_err().is_validation());
    }

    #[test]
    fn test_validation_accepts_zero_prices() {
        let mut input = new_plan();
        input.price_per_url = Decimal::ZERO;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_negatives() {
        let mut input = new_plan();
        input.price_per_visit = dec!(-0.01);
        assert!(input.validate().is_err());

        let mut input = new_plan();
        input.free_visits_per_url = -1;
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unstorable_prices() {
        let mut input = new_plan();
        input.price_per_url = dec!(0.005);
        assert!(input.validate().is_err());

        let mut input = new_plan();
        input.price_per_visit = dec!(1000000000000.00);
        assert!(input.validate().is_err());

        let mut input = new_plan();
        input.price_per_visit = dec!(2.500);
        assert!(input.validate().is_ok());
    }
}
