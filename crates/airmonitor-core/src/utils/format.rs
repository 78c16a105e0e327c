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

/// Format an optional reading with one decimal place
pub fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}", v),
        None => "-".to_string(),
    }
}

/// Turn an Airly level such as "VERY_LOW" into "Very low"
pub fn format_level(level: &str) -> String {
    let words = level.replace('_', " ").to_lowercase();
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Format a measurement window in local time, e.g. "Nov 24 10:45-11:45"
pub fn format_window(from: Option<DateTime<Utc>>, till: Option<DateTime<Utc>>) -> String {
    match (from, till) {
        (Some(from), Some(till)) => {
            let from = from.with_timezone(&Local);
            let till = till.with_timezone(&Local);
            if from.date_naive() == till.date_naive() {
                format!("{}-{}", from.format("%b %d %H:%M"), till.format("%H:%M"))
            } else {
                format!("{} - {}", from.format("%b %d %H:%M"), till.format("%b %d %H:%M"))
            }
        }
        (Some(from), None) => format!("since {}", from.with_timezone(&Local).format("%b %d %H:%M")),
        (None, Some(till)) => format!("until {}", till.with_timezone(&Local).format("%b %d %H:%M")),
        (None, None) => "unknown time".to_string(),
    }
}
