use crate::{domain::TimeUnit, error::ConfigurationError};

const MINUTE_MS: i64 = 60_000;

/// Minute count of `amount` units, used by the ranker and for expiries.
pub fn to_minutes(amount: i64, unit: TimeUnit) -> Result<i64, ConfigurationError> {
    amount
        .checked_mul(unit.minutes())
        .ok_or(ConfigurationError::DurationOverflow {
            amount,
            unit: unit.as_str(),
        })
}

/// Absolute epoch-millisecond expiry `amount` units after `now_ms`.
pub fn future_timestamp_ms(
    amount: i64,
    unit: TimeUnit,
    now_ms: i64,
) -> Result<i64, ConfigurationError> {
    let overflow = || ConfigurationError::DurationOverflow {
        amount,
        unit: unit.as_str(),
    };
    to_minutes(amount, unit)?
        .checked_mul(MINUTE_MS)
        .and_then(|offset| now_ms.checked_add(offset))
        .ok_or_else(overflow)
}

/// Same as [`future_timestamp_ms`] for a duration already normalised to minutes.
pub fn expiry_after_minutes(minutes: i64, now_ms: i64) -> Result<i64, ConfigurationError> {
    future_timestamp_ms(minutes, TimeUnit::Minutes, now_ms)
}
