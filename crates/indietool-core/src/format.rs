//! Formatting utilities

use chrono::{DateTime, Local, Utc};

/// Placeholder printed instead of a hidden secret value
pub const MASK: &str = "***MASKED***";

/// Format a timestamp in local time as YYYY-MM-DD HH:MM:SS
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Format a timestamp as relative (e.g., "2m ago" or "in 3d")
pub fn relative_time(dt: DateTime<Utc>) -> String {
    let now = Utc::now();
    let diff = now.signed_duration_since(dt);
    let (secs, future) = if diff.num_seconds() < 0 {
        (-diff.num_seconds(), true)
    } else {
        (diff.num_seconds(), false)
    };

    let amount = if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    };

    if future {
        format!("in {}", amount)
    } else {
        format!("{} ago", amount)
    }
}

/// Pad a string with spaces to the given display width
pub fn pad_right(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}

/// Truncate a string to max length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
