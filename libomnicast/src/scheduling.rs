//! Schedule validation and time parsing utilities
//!
//! The lead-time rule and calendar/time combination live here; parsing of
//! human-readable schedule expressions is used by the CLIs.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::{OmnicastError, Result};

/// Minimum lead time before a post may run. Guards against a post landing
/// inside an in-flight dispatch cycle.
pub const MIN_LEAD_MINUTES: i64 = 5;

/// Combine a calendar date and a time-of-day into one UTC instant.
pub fn combine_date_time(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Whether `scheduled_for` is far enough in the future, evaluated at `now`.
///
/// Strictly greater than now + 5 minutes: an instant exactly on the
/// boundary is rejected.
pub fn is_schedulable_at(scheduled_for: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    scheduled_for > now + Duration::minutes(MIN_LEAD_MINUTES)
}

/// Whether `scheduled_for` satisfies the lead-time rule right now.
pub fn validate_schedule(scheduled_for: DateTime<Utc>) -> bool {
    is_schedulable_at(scheduled_for, Utc::now())
}

/// Parse a schedule string into a DateTime
///
/// Supports relative durations ("1h", "30m", "2d") and natural language
/// ("tomorrow", "next friday 10am").
///
/// # Errors
///
/// Returns an error if the time format is invalid or cannot be parsed.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(OmnicastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(OmnicastError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

/// Parse a duration string into a chrono::Duration
fn parse_duration(input: &str) -> Result<Duration> {
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let seconds = std_duration.as_secs() as i64;
        return Duration::try_seconds(seconds)
            .ok_or_else(|| OmnicastError::InvalidInput("Duration out of range".to_string()));
    }

    Err(OmnicastError::InvalidInput(format!(
        "Could not parse duration: {}",
        input
    )))
}

/// Parse natural language time expression
fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| OmnicastError::InvalidInput(format!("Could not parse time: {}", e)))
}
