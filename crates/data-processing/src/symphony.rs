use chrono::NaiveDate;
use serde_json::Value;

/// The date a symphony was last edited, from its details response.
///
/// Everything after that date is out of sample. The first ten characters of
/// `last_semantic_update_at` are read as `YYYY-MM-DD`; `fallback` is used when
/// the field is missing, not a string or not a date.
pub fn oos_start_from_symphony(symphony: &Value, fallback: NaiveDate) -> NaiveDate {
    let Some(stamp) = symphony.get("last_semantic_update_at").and_then(Value::as_str) else {
        return fallback;
    };

    let day = stamp.get(..10).unwrap_or(stamp);
    match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
        Ok(date) => date,
        Err(e) => {
            tracing::warn!(%stamp, error = %e, %fallback, "Unreadable last_semantic_update_at");
            fallback
        }
    }
}
