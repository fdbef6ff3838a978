use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::AppError;

/// Current-state projection of one employee's day.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: String,
    pub employee_id: String,
    pub attendance_date: NaiveDate,
    pub clock_in: Option<NaiveDateTime>,
    pub clock_out: Option<NaiveDateTime>,
}

/// Discriminator stored in `attendance_history.attendance_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceType {
    In = 1,
    Out = 2,
}

impl AttendanceType {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(AttendanceType::In),
            2 => Some(AttendanceType::Out),
            _ => None,
        }
    }
}

/// `type` field of the clock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ClockAction {
    ClockIn,
    ClockOut,
}

impl ClockAction {
    pub fn history_type(self) -> AttendanceType {
        match self {
            ClockAction::ClockIn => AttendanceType::In,
            ClockAction::ClockOut => AttendanceType::Out,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum AttendanceStatus {
    #[serde(rename = "On Time")]
    OnTime,
    Late,
    #[serde(rename = "Left Early")]
    LeftEarly,
    Unknown,
}

/// Today's row as seen inside the clock transaction.
#[derive(Debug, sqlx::FromRow)]
pub struct TodayRecord {
    pub id: String,
    pub clock_out: Option<NaiveDateTime>,
}

/// NoRecord -> ClockedIn -> ClockedOut, per employee per day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceDay {
    NoRecord,
    ClockedIn { attendance_id: String },
    ClockedOut { attendance_id: String },
}

/// Writes required to move the day forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockTransition {
    /// Insert today's attendance row plus an `in` history entry.
    Open,
    /// Stamp clock-out on the existing row plus an `out` history entry.
    Close { attendance_id: String },
}

impl From<Option<TodayRecord>> for AttendanceDay {
    fn from(record: Option<TodayRecord>) -> Self {
        match record {
            None => AttendanceDay::NoRecord,
            Some(TodayRecord {
                id,
                clock_out: None,
            }) => AttendanceDay::ClockedIn { attendance_id: id },
            Some(TodayRecord { id, .. }) => AttendanceDay::ClockedOut { attendance_id: id },
        }
    }
}

impl AttendanceDay {
    pub fn apply(&self, action: ClockAction) -> Result<ClockTransition, AppError> {
        match (self, action) {
            (AttendanceDay::NoRecord, ClockAction::ClockIn) => Ok(ClockTransition::Open),
            (_, ClockAction::ClockIn) => Err(AppError::conflict("already clocked in today")),
            (AttendanceDay::ClockedIn { attendance_id }, ClockAction::ClockOut) => {
                Ok(ClockTransition::Close {
                    attendance_id: attendance_id.clone(),
                })
            }
            (AttendanceDay::NoRecord, ClockAction::ClockOut) => {
                Err(AppError::conflict("no clock-in record found today"))
            }
            (AttendanceDay::ClockedOut { .. }, ClockAction::ClockOut) => {
                Err(AppError::conflict("already clocked out today"))
            }
        }
    }
}

/// One row of the attendance log listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceItem {
    #[schema(example = "5b7c...")]
    pub id: String,
    #[serde(rename = "employeeID")]
    #[schema(example = "EMP-001")]
    pub employee_id: String,
    #[schema(example = "John Doe")]
    pub employee_name: String,
    #[schema(example = "Engineering")]
    pub department_name: String,
    #[schema(example = "2024-03-04T01:15:00Z", format = "date-time", value_type = String)]
    pub clock: DateTime<Utc>,
    #[schema(example = "09:00:00")]
    pub max_clock: String,
    #[schema(example = "2024-03-04T01:15:00Z", format = "date-time", value_type = String)]
    pub date_attendance: DateTime<Utc>,
    #[schema(example = "on my way")]
    pub description: String,
    pub status: AttendanceStatus,
    #[schema(example = "in")]
    pub attendance_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn open_record(id: &str) -> Option<TodayRecord> {
        Some(TodayRecord {
            id: id.to_string(),
            clock_out: None,
        })
    }

    #[test]
    fn clock_type_parses_request_tokens() {
        assert_eq!(ClockAction::from_str("clock_in").unwrap(), ClockAction::ClockIn);
        assert_eq!(ClockAction::from_str("clock_out").unwrap(), ClockAction::ClockOut);
        assert!(ClockAction::from_str("lunch").is_err());
        assert!(ClockAction::from_str("CLOCK_IN").is_err());
    }

    #[test]
    fn history_discriminators() {
        assert_eq!(ClockAction::ClockIn.history_type().code(), 1);
        assert_eq!(ClockAction::ClockOut.history_type().code(), 2);
        assert_eq!(AttendanceType::from_code(2), Some(AttendanceType::Out));
        assert_eq!(AttendanceType::from_code(7), None);
        assert_eq!(AttendanceType::In.to_string(), "in");
    }

    #[test]
    fn first_clock_in_opens_the_day() {
        assert_eq!(
            AttendanceDay::from(None).apply(ClockAction::ClockIn).unwrap(),
            ClockTransition::Open
        );
    }

    #[test]
    fn second_clock_in_conflicts() {
        let day = AttendanceDay::from(open_record("a-1"));
        let err = day.apply(ClockAction::ClockIn).unwrap_err();
        assert!(matches!(err, AppError::StateConflict(ref m) if m == "already clocked in today"));
    }

    #[test]
    fn clock_out_closes_the_open_row() {
        let day = AttendanceDay::from(open_record("a-1"));
        assert_eq!(
            day.apply(ClockAction::ClockOut).unwrap(),
            ClockTransition::Close {
                attendance_id: "a-1".to_string()
            }
        );
    }

    #[test]
    fn clock_out_without_clock_in_conflicts() {
        let err = AttendanceDay::NoRecord
            .apply(ClockAction::ClockOut)
            .unwrap_err();
        assert!(matches!(err, AppError::StateConflict(ref m) if m == "no clock-in record found today"));
    }

    #[test]
    fn closed_day_accepts_nothing() {
        let closed = AttendanceDay::from(Some(TodayRecord {
            id: "a-1".to_string(),
            clock_out: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(10, 0, 0),
        }));
        assert!(matches!(closed, AttendanceDay::ClockedOut { .. }));
        assert!(closed.apply(ClockAction::ClockIn).is_err());
        assert!(closed.apply(ClockAction::ClockOut).is_err());
    }

    #[test]
    fn status_serializes_as_labels() {
        assert_eq!(
            serde_json::to_value(AttendanceStatus::LeftEarly).unwrap(),
            "Left Early"
        );
        assert_eq!(serde_json::to_value(AttendanceStatus::OnTime).unwrap(), "On Time");
    }
}
