//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Format a remaining lifetime for countdown display.
///
/// - Under one hour: `M:SS`
/// - One hour or more: `H:MM:SS`
///
/// Negative values are clamped to zero; an expired session shows `0:00`.
///
/// # Examples
///
/// ```
/// use attend_common::time::format_countdown;
///
/// assert_eq!(format_countdown(0), "0:00");
/// assert_eq!(format_countdown(75), "1:15");
/// assert_eq!(format_countdown(3661), "1:01:01");
/// assert_eq!(format_countdown(-5), "0:00");
/// ```
pub fn format_countdown(seconds: i64) -> String {
    let total = seconds.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
