use chrono::{DateTime, Local, Utc};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

/// Appointment-style timestamp in local time, e.g. "Jun 01, 2024 16:30"
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%b %d, %Y %H:%M").to_string()
}

pub fn format_date(dt: &DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%b %d, %Y").to_string()
}

/// Human readable remaining session time
pub fn format_remaining(minutes: i64) -> String {
    match minutes {
        0 => "expired".to_string(),
        1..=59 => format!("{}m left", minutes),
        _ => format!("{}h {}m left", minutes / 60, minutes % 60),
    }
}
