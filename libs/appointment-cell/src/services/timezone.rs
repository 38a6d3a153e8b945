// libs/appointment-cell/src/services/timezone.rs
use std::sync::LazyLock;

use chrono::{DateTime, Days, Duration, Months, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppointmentError;
use crate::models::AmbiguousTimePolicy;

pub const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static LOCAL_DATETIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}$")
        .expect("local datetime pattern is valid")
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minutes,
    Days,
    Months,
    Years,
}

/// Converts between client wall-clock strings and UTC instants.
/// Everything downstream compares instants only.
#[derive(Debug, Clone, Default)]
pub struct TimeConversionService {
    ambiguous_policy: AmbiguousTimePolicy,
}

impl TimeConversionService {
    pub fn new(ambiguous_policy: AmbiguousTimePolicy) -> Self {
        Self { ambiguous_policy }
    }

    /// Parses `YYYY-MM-DD HH:MM:SS` as wall-clock time in `timezone`.
    /// Local times skipped by a DST transition are rejected; repeated ones
    /// resolve by the configured [`AmbiguousTimePolicy`].
    pub fn to_instant(&self, local: &str, timezone: &str) -> Result<DateTime<Utc>, AppointmentError> {
        let naive = parse_local(local)?;
        let tz = parse_timezone(timezone)?;

        let resolved = tz.from_local_datetime(&naive);
        let instant = match (resolved.earliest(), resolved.latest()) {
            (Some(earliest), Some(latest)) if earliest == latest => earliest,
            (Some(earliest), Some(latest)) => match self.ambiguous_policy {
                AmbiguousTimePolicy::Earliest => earliest,
                AmbiguousTimePolicy::Latest => latest,
                AmbiguousTimePolicy::Reject => {
                    return Err(AppointmentError::validation(format!(
                        "Local time '{}' is ambiguous in {} because clocks fall back; choose another time",
                        local, timezone
                    )));
                }
            },
            _ => {
                return Err(AppointmentError::validation(format!(
                    "Local time '{}' does not exist in {} because clocks spring forward",
                    local, timezone
                )));
            }
        };

        debug!("Resolved {} ({}) to {}", local, timezone, instant.to_rfc3339());
        Ok(instant.with_timezone(&Utc))
    }

    pub fn to_local(&self, instant: DateTime<Utc>, timezone: &str) -> Result<String, AppointmentError> {
        let tz = parse_timezone(timezone)?;
        Ok(instant.with_timezone(&tz).format(LOCAL_DATETIME_FORMAT).to_string())
    }

    /// Calendar-aware addition on the UTC calendar. Month and year steps clamp
    /// to the last day of the target month (Jan 31 + 1 month = Feb 28/29).
    pub fn add(&self, instant: DateTime<Utc>, amount: i64, unit: TimeUnit) -> Result<DateTime<Utc>, AppointmentError> {
        let out_of_range = || AppointmentError::validation(format!(
            "Adding {} {:?} to {} is out of range", amount, unit, instant.to_rfc3339()
        ));

        match unit {
            TimeUnit::Minutes => Duration::try_minutes(amount)
                .and_then(|delta| instant.checked_add_signed(delta))
                .ok_or_else(out_of_range),
            TimeUnit::Days => {
                let days = Days::new(amount.unsigned_abs());
                if amount >= 0 {
                    instant.checked_add_days(days)
                } else {
                    instant.checked_sub_days(days)
                }
                .ok_or_else(out_of_range)
            }
            TimeUnit::Months => add_months(instant, amount).ok_or_else(out_of_range),
            TimeUnit::Years => amount
                .checked_mul(12)
                .and_then(|months| add_months(instant, months))
                .ok_or_else(out_of_range),
        }
    }

    /// Physical-instant equality, independent of the zone either side is expressed in.
    pub fn equal<A: TimeZone, B: TimeZone>(&self, a: &DateTime<A>, b: &DateTime<B>) -> bool {
        a == b
    }
}

fn add_months(instant: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let step = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        instant.checked_add_months(step)
    } else {
        instant.checked_sub_months(step)
    }
}

fn parse_local(local: &str) -> Result<NaiveDateTime, AppointmentError> {
    let format_error = || AppointmentError::validation(format!(
        "Invalid date/time '{}': expected format YYYY-MM-DD HH:MM:SS (24-hour clock)",
        local
    ));

    if !LOCAL_DATETIME_PATTERN.is_match(local) {
        return Err(format_error());
    }

    let naive = NaiveDateTime::parse_from_str(local, LOCAL_DATETIME_FORMAT)
        .map_err(|_| format_error())?;

    // chrono accepts second 60 as a leap second
    if naive.nanosecond() >= 1_000_000_000 {
        return Err(format_error());
    }

    Ok(naive)
}

pub fn parse_timezone(timezone: &str) -> Result<Tz, AppointmentError> {
    timezone
        .parse::<Tz>()
        .map_err(|_| AppointmentError::validation(format!("Unknown timezone '{}'", timezone)))
}
