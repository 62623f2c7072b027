use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

pub struct TimeUtils;

impl TimeUtils {
    pub const STANDARD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
}

pub fn now_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn epoch_ms_to_date_string(epoch_ms: i64) -> String {
    // Used for display purposes
    match DateTime::from_timestamp_millis(epoch_ms) {
        Some(dt) => format!("{}", dt.format(TimeUtils::STANDARD_TIME_FORMAT)),
        None => format!("<invalid {}ms>", epoch_ms),
    }
}

/// Local hour-of-day and weekday of a UTC epoch-ms timestamp.
pub fn local_hour_and_weekday(epoch_ms: i64, utc_offset_hours: i32) -> Option<(u8, Weekday)> {
    let offset = FixedOffset::east_opt(utc_offset_hours.checked_mul(3600)?)?;
    let local = DateTime::from_timestamp_millis(epoch_ms)?.with_timezone(&offset);
    Some((local.hour() as u8, local.weekday()))
}
