//! Booking (class schedule) and attendance data model.
//!
//! A booking assigns one teacher and one student to a time slot on a civil date.
//! Times carry no timezone; the surrounding layer decides what "today" means.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Result, ScheduleError};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(BookingId);
id_type!(AttendanceId);
id_type!(TeacherId);
id_type!(StudentId);
id_type!(GradeId);
id_type!(
    /// The acting user, stamped into audit fields.
    UserId
);

/// A time-of-day interval `[start, end)` with `end` strictly after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if end <= start {
            return Err(ScheduleError::InvalidTimeRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Half-open overlap: `self.start < other.end && self.end > other.start`.
    /// Ranges that merely touch do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BookingStatus {
    #[default]
    Scheduled,
    Completed,
    Missed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Completed => "Completed",
            Self::Missed => "Missed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(Self::Scheduled),
            "Completed" => Ok(Self::Completed),
            "Missed" => Ok(Self::Missed),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Who created or last touched a record, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_by: Option<UserId>,
    pub created_at: NaiveDateTime,
    pub updated_by: Option<UserId>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Audit {
    pub fn created(by: UserId, at: NaiveDateTime) -> Self {
        Self {
            created_by: Some(by),
            created_at: at,
            updated_by: None,
            updated_at: None,
        }
    }

    pub fn touch(&mut self, by: UserId, at: NaiveDateTime) {
        self.updated_by = Some(by);
        self.updated_at = Some(at);
    }
}

/// A booking that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub teacher_id: TeacherId,
    pub student_id: StudentId,
    pub grade_id: GradeId,
    pub date: NaiveDate,
    pub slot: TimeRange,
    pub schedule_type: String,
    pub status: BookingStatus,
    pub room: Option<String>,
    pub notes: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub audit: Audit,
}

/// A persisted booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub teacher_id: TeacherId,
    pub student_id: StudentId,
    pub grade_id: GradeId,
    pub date: NaiveDate,
    pub slot: TimeRange,
    pub schedule_type: String,
    pub status: BookingStatus,
    pub room: Option<String>,
    pub notes: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub audit: Audit,
}

impl Booking {
    pub fn with_id(id: BookingId, new: NewBooking) -> Self {
        Self {
            id,
            teacher_id: new.teacher_id,
            student_id: new.student_id,
            grade_id: new.grade_id,
            date: new.date,
            slot: new.slot,
            schedule_type: new.schedule_type,
            status: new.status,
            room: new.room,
            notes: new.notes,
            is_recurring: new.is_recurring,
            recurrence_pattern: new.recurrence_pattern,
            audit: new.audit,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.slot.duration_minutes()
    }

    pub fn involves(&self, party: Party) -> bool {
        match party {
            Party::Teacher(id) => self.teacher_id == id,
            Party::Student(id) => self.student_id == id,
        }
    }
}

/// Caller input for creating or editing a booking.
///
/// Times are raw so that validation happens once, in [`BookingDraft::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub teacher_id: TeacherId,
    pub student_id: StudentId,
    pub grade_id: GradeId,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub schedule_type: String,
    pub status: BookingStatus,
    pub room: Option<String>,
    pub notes: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
}

impl BookingDraft {
    /// A regular, non-recurring draft in `Scheduled` status.
    pub fn new(
        teacher_id: TeacherId,
        student_id: StudentId,
        grade_id: GradeId,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Self {
        Self {
            teacher_id,
            student_id,
            grade_id,
            date,
            start,
            end,
            schedule_type: "Regular".to_string(),
            status: BookingStatus::Scheduled,
            room: None,
            notes: None,
            is_recurring: false,
            recurrence_pattern: None,
        }
    }

    pub fn recurring(mut self, pattern: &str) -> Self {
        self.is_recurring = true;
        self.recurrence_pattern = Some(pattern.to_string());
        self
    }

    pub fn validate(&self) -> Result<TimeRange> {
        TimeRange::new(self.start, self.end)
    }
}

/// One side of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Teacher(TeacherId),
    Student(StudentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Present" => Ok(Self::Present),
            "Absent" => Ok(Self::Absent),
            "Late" => Ok(Self::Late),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Lesson details entered alongside an attendance status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LessonReport {
    pub actual_start: Option<NaiveTime>,
    pub actual_end: Option<NaiveTime>,
    pub lesson_topic: Option<String>,
    pub student_progress: Option<String>,
    pub teacher_notes: Option<String>,
    pub homework_assigned: Option<String>,
    pub next_lesson_prep: Option<String>,
    pub performance_score: Option<u8>,
}

/// Caller input for recording or editing attendance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceDraft {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub report: LessonReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttendance {
    pub booking_id: BookingId,
    pub student_id: StudentId,
    pub teacher_id: TeacherId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub report: LessonReport,
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub booking_id: BookingId,
    pub student_id: StudentId,
    pub teacher_id: TeacherId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub report: LessonReport,
    pub audit: Audit,
}

impl Attendance {
    pub fn with_id(id: AttendanceId, new: NewAttendance) -> Self {
        Self {
            id,
            booking_id: new.booking_id,
            student_id: new.student_id,
            teacher_id: new.teacher_id,
            date: new.date,
            status: new.status,
            report: new.report,
            audit: new.audit,
        }
    }
}
