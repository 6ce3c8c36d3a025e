//! Human-readable time formatting
//!
//! Track positions and durations are shown as `m:ss`, minutes unpadded.

/// Format seconds as `m:ss`.
///
/// Fractional seconds are truncated. Negative and non-finite values display as `0:00`.
///
/// # Examples
///
/// ```
/// use slowverb_common::human_time::format_clock;
///
/// assert_eq!(format_clock(0.0), "0:00");
/// assert_eq!(format_clock(5.9), "0:05");
/// assert_eq!(format_clock(125.0), "2:05");
/// assert_eq!(format_clock(3600.0), "60:00");
/// ```
pub fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format a position against a duration, e.g. `1:05 / 3:20`
pub fn format_progress(position_seconds: f64, duration_seconds: f64) -> String {
    format!(
        "{} / {}",
        format_clock(position_seconds),
        format_clock(duration_seconds)
    )
}
