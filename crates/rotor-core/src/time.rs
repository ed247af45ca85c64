//! Time and duration utilities.

use chrono::{DateTime, Duration, Utc};
use rotor_types::{Result, RotationError};

/// Format a duration in human-readable form.
pub fn pretty_duration(duration: Duration) -> String {
    let secs = duration.num_seconds();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    } else {
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3600;
        format!("{}d {}h", days, hours)
    }
}

/// Format timestamp in fuzzy relative time.
pub fn fuzzy_time(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let diff = now.signed_duration_since(timestamp);

    if diff.num_seconds() < 0 {
        return format!("in {}", pretty_duration(-diff));
    }

    if diff.num_seconds() < 60 {
        "just now".to_string()
    } else if diff.num_minutes() < 60 {
        format!("{} minutes ago", diff.num_minutes())
    } else if diff.num_hours() < 24 {
        format!("{} hours ago", diff.num_hours())
    } else {
        format!("{} days ago", diff.num_days())
    }
}

/// Parse duration from string (e.g., "90s", "5m", "2h", "90d").
///
/// A bare number is taken as seconds. Negative values are rejected.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || RotationError::Validation(format!("Invalid duration '{}': expected <n>[s|m|h|d]", s));

    let (digits, unit) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], c),
        Some(_) => (s, 's'),
        None => return Err(invalid()),
    };

    let value: i64 = digits.trim().parse().map_err(|_| invalid())?;
    if value < 0 {
        return Err(invalid());
    }

    let duration = match unit {
        's' => Duration::try_seconds(value),
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        _ => return Err(invalid()),
    };
    duration.ok_or_else(|| RotationError::Validation(format!("Duration '{}' is out of range", s)))
}

/// Convert to a `std::time::Duration`, clamping negatives to zero.
pub fn to_std(duration: Duration) -> std::time::Duration {
    duration.to_std().unwrap_or(std::time::Duration::ZERO)
}
