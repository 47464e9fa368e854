//! Error types for scheduling operations.

use thiserror::Error;

use crate::booking::{AttendanceId, BookingId, BookingStatus};
use crate::conflict::Conflict;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("End time must be after start time.")]
    InvalidTimeRange,

    /// The requested slot overlaps an existing booking. Displays the
    /// user-facing conflict message verbatim.
    #[error("{0}")]
    Conflict(Conflict),

    #[error("Schedule {0} not found.")]
    NotFound(BookingId),

    #[error("Attendance record {0} not found.")]
    AttendanceNotFound(AttendanceId),

    #[error("Attendance already recorded for this class schedule.")]
    AttendanceExists,

    /// The booking is completed, missed or cancelled.
    #[error("Attendance can only be recorded for a scheduled class.")]
    NotScheduled(BookingStatus),

    #[error("Cannot delete schedule that has attendance records.")]
    HasAttendance,

    #[error("Cannot delete completed schedule from the past.")]
    CompletedInPast,

    #[error("Recurrence error: {0}")]
    Recurrence(String),

    #[error("Store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
