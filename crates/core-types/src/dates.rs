use crate::error::CoreError;
use chrono::{Datelike, Days, NaiveDate};

/// Years outside this range are suspicious but still decoded.
const SANE_YEARS: std::ops::RangeInclusive<i32> = 1970..=2100;
const MAX_DAY_OFFSET: u64 = i32::MAX as u64;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Converts a Composer trading day (days since 1970-01-01) into a calendar date.
///
/// This is pure calendar-day arithmetic: no timezone or business-day logic.
pub fn decode_trading_date(day_offset: i64) -> Result<NaiveDate, CoreError> {
    let days = u64::try_from(day_offset).map_err(|_| {
        CoreError::InvalidDate(format!("day offset {day_offset} must be >= 0"))
    })?;

    let date = (days <= MAX_DAY_OFFSET)
        .then(|| epoch().checked_add_days(Days::new(days)))
        .flatten()
        .ok_or_else(|| CoreError::InvalidDate(format!("day offset {day_offset} is out of range")))?;

    if !SANE_YEARS.contains(&date.year()) {
        tracing::warn!(%date, day_offset, "Unusual trading date decoded");
    }

    Ok(date)
}

/// Decodes a trading day stored as a JSON object key (e.g. `"19723"`).
pub fn decode_trading_key(key: &str) -> Result<NaiveDate, CoreError> {
    let day_offset = key
        .trim()
        .parse::<i64>()
        .map_err(|e| CoreError::InvalidDate(format!("cannot convert {key:?} to a trading day: {e}")))?;
    decode_trading_date(day_offset)
}

/// The inverse of [`decode_trading_date`].
pub fn encode_trading_date(date: NaiveDate) -> i64 {
    (date - epoch()).num_days()
}
