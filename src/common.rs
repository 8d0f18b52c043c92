/// Money and profile helpers shared by the checkout services
use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Shortest email the checkout accepts on a user profile.
pub const MIN_EMAIL_LEN: usize = 5;

/// Converts a major-unit amount to minor units (cents), rounding halves
/// away from zero: 19.995 becomes 2000.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount {} is out of range", amount)))
}

/// Rejects zero and negative amounts.
pub fn require_positive_amount(amount: Decimal) -> Result<Decimal, ServiceError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(ServiceError::ValidationError(
            "Amount must be greater than zero".to_string(),
        ))
    }
}

/// True when `email` is long enough and syntactically an address.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    email.len() >= MIN_EMAIL_LEN && validator::validate_email(email)
}
