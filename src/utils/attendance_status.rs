use chrono::{DateTime, NaiveTime, ParseError, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::model::attendance::{AttendanceStatus, AttendanceType};

/// Cutoffs are bare `HH:MM:SS` values with no date part.
pub fn parse_cutoff(raw: &str) -> Result<NaiveTime, ParseError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S")
}

/// Wall-clock time of `instant` in `zone`, truncated to whole seconds.
fn time_of_day<Z: TimeZone>(instant: DateTime<Utc>, zone: &Z) -> NaiveTime {
    let local = instant.with_timezone(zone);
    NaiveTime::from_hms_opt(local.hour(), local.minute(), local.second())
        .unwrap_or_else(|| local.time())
}

/// True when the clock-in time of day is strictly after the cutoff.
pub fn is_late(clock_in: DateTime<Utc>, cutoff: &str, zone: Tz) -> Result<bool, ParseError> {
    let cutoff = parse_cutoff(cutoff)?;
    Ok(time_of_day(clock_in, &zone) > cutoff)
}

/// True when the clock-out time of day is strictly before the cutoff.
pub fn is_early(clock_out: DateTime<Utc>, cutoff: &str, zone: Tz) -> Result<bool, ParseError> {
    let cutoff = parse_cutoff(cutoff)?;
    Ok(time_of_day(clock_out, &zone) < cutoff)
}

/// Best-effort status for one history row; a bad cutoff yields `Unknown`.
pub fn classify(
    kind: AttendanceType,
    clock: DateTime<Utc>,
    cutoff: &str,
    zone: Tz,
) -> AttendanceStatus {
    let evaluated = match kind {
        AttendanceType::In => is_late(clock, cutoff, zone).map(|late| {
            if late {
                AttendanceStatus::Late
            } else {
                AttendanceStatus::OnTime
            }
        }),
        AttendanceType::Out => is_early(clock, cutoff, zone).map(|early| {
            if early {
                AttendanceStatus::LeftEarly
            } else {
                AttendanceStatus::OnTime
            }
        }),
    };

    evaluated.unwrap_or_else(|e| {
        warn!(cutoff, error = %e, "Unparseable attendance cutoff");
        AttendanceStatus::Unknown
    })
}
