//! Money amounts as stored in `NUMERIC(14,2)` columns.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Largest value a `NUMERIC(14,2)` column holds.
pub const MAX_AMOUNT: Decimal = dec!(999999999999.99);

/// Digits allowed after the decimal point.
pub const SCALE: u32 = 2;

/// True when `amount` is storable without rounding or overflow.
pub fn fits_column(amount: Decimal) -> bool {
    amount.normalize().scale() <= SCALE && amount.abs() <= MAX_AMOUNT
}

/// `count * unit_price`, or `None` when the product overflows or does not fit
/// a money column.
pub fn checked_cost(count: i64, unit_price: Decimal) -> Option<Decimal> {
    Decimal::from(count)
        .checked_mul(unit_price)
        .filter(|cost| fits_column(*cost))
}
