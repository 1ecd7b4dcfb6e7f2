use anyhow::anyhow;
use chrono::{DateTime, Days, NaiveDate, Utc};

/// Whole days elapsed between `then` and `now`, truncated toward zero.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days()
}

pub fn day_of(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Accepts `today`, `tomorrow`, `yesterday`, or a `YYYY-MM-DD` literal.
pub fn parse_day(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    match input.trim().to_ascii_lowercase().as_str() {
        "today" => Ok(today),
        "tomorrow" => today
            .checked_add_days(Days::new(1))
            .ok_or_else(|| anyhow!("date out of range")),
        "yesterday" => today
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| anyhow!("date out of range")),
        literal => NaiveDate::parse_from_str(literal, "%Y-%m-%d")
            .map_err(|_| anyhow!("invalid date: {input} (expected YYYY-MM-DD)")),
    }
}
