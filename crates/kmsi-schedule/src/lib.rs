//! # kmsi-schedule
//!
//! Class scheduling core for the KMSI music-school back office.
//!
//! Decides whether a teacher and a student are both free for a time slot, books
//! the slot when they are, projects weekly repeats of recurring lessons, and runs
//! the booking lifecycle (attendance completes or misses a lesson; deleting a
//! future lesson cancels it and frees the slot).
//!
//! ## Modules
//!
//! - [`booking`]: Booking, attendance and identifier types
//! - [`conflict`]: Half-open interval overlap checks per teacher and per student
//! - [`recurrence`]: Weekly occurrence projection via RFC 5545 rules
//! - [`scheduler`]: Create/update/delete and attendance operations
//! - [`store`]: The persistence trait plus in-memory and SQLite stores
//! - [`error`]: Error types

pub mod booking;
pub mod conflict;
pub mod error;
pub mod recurrence;
pub mod scheduler;
pub mod store;

pub use booking::{
    Attendance, AttendanceDraft, AttendanceId, AttendanceStatus, Booking, BookingDraft, BookingId,
    BookingStatus, GradeId, LessonReport, StudentId, TeacherId, TimeRange, UserId,
};
pub use conflict::{check_conflict, Availability, Conflict, SlotQuery};
pub use error::ScheduleError;
pub use recurrence::{project_recurring, Projection, RecurrencePattern};
pub use scheduler::{Created, Deletion, RequestContext, Scheduler};
pub use store::{BookingStore, MemoryStore, SqliteStore};
