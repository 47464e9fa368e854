//! SQLite-backed store.
//!
//! Times of day are stored as seconds from midnight so that range predicates are
//! plain integer comparisons. Dates and audit timestamps use rusqlite's chrono
//! text encoding.

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Timelike};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use super::BookingStore;
use crate::booking::{
    Attendance, AttendanceId, Audit, Booking, BookingId, BookingStatus, GradeId, LessonReport,
    NewAttendance, NewBooking, Party, StudentId, TeacherId, TimeRange, UserId,
};
use crate::error::Result;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

const BOOKING_COLUMNS: &str = "booking_id, teacher_id, student_id, grade_id, schedule_date,
     start_secs, end_secs, schedule_type, status, room, notes, is_recurring,
     recurrence_pattern, created_by, created_at, updated_by, updated_at";

const ATTENDANCE_COLUMNS: &str = "attendance_id, booking_id, student_id, teacher_id,
     attendance_date, actual_start_secs, actual_end_secs, status, lesson_topic,
     student_progress, teacher_notes, homework_assigned, next_lesson_prep,
     performance_score, created_by, created_at, updated_by, updated_at";

#[derive(Error, Debug)]
enum ColumnError {
    #[error("invalid time of day: {0} seconds from midnight")]
    TimeOfDay(i64),
    #[error("end time {end} is not after start time {start}")]
    Range { start: NaiveTime, end: NaiveTime },
    #[error(transparent)]
    Status(#[from] crate::booking::UnknownStatus),
}

fn bad_column(idx: usize, ty: Type, err: ColumnError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn secs(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: i64 = row.get(idx)?;
    u32::try_from(raw)
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0))
        .ok_or_else(|| bad_column(idx, Type::Integer, ColumnError::TimeOfDay(raw)))
}

fn optional_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => time_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    let start = time_at(row, 5)?;
    let end = time_at(row, 6)?;
    let slot = TimeRange::new(start, end)
        .map_err(|_| bad_column(6, Type::Integer, ColumnError::Range { start, end }))?;
    let status: String = row.get(8)?;

    Ok(Booking {
        id: BookingId(row.get(0)?),
        teacher_id: TeacherId(row.get(1)?),
        student_id: StudentId(row.get(2)?),
        grade_id: GradeId(row.get(3)?),
        date: row.get(4)?,
        slot,
        schedule_type: row.get(7)?,
        status: status
            .parse()
            .map_err(|e| bad_column(8, Type::Text, ColumnError::from(e)))?,
        room: row.get(9)?,
        notes: row.get(10)?,
        is_recurring: row.get(11)?,
        recurrence_pattern: row.get(12)?,
        audit: Audit {
            created_by: row.get::<_, Option<i64>>(13)?.map(UserId),
            created_at: row.get(14)?,
            updated_by: row.get::<_, Option<i64>>(15)?.map(UserId),
            updated_at: row.get(16)?,
        },
    })
}

fn attendance_from_row(row: &Row<'_>) -> rusqlite::Result<Attendance> {
    let status: String = row.get(7)?;

    Ok(Attendance {
        id: AttendanceId(row.get(0)?),
        booking_id: BookingId(row.get(1)?),
        student_id: StudentId(row.get(2)?),
        teacher_id: TeacherId(row.get(3)?),
        date: row.get(4)?,
        status: status
            .parse()
            .map_err(|e| bad_column(7, Type::Text, ColumnError::from(e)))?,
        report: LessonReport {
            actual_start: optional_time_at(row, 5)?,
            actual_end: optional_time_at(row, 6)?,
            lesson_topic: row.get(8)?,
            student_progress: row.get(9)?,
            teacher_notes: row.get(10)?,
            homework_assigned: row.get(11)?,
            next_lesson_prep: row.get(12)?,
            performance_score: row.get(13)?,
        },
        audit: Audit {
            created_by: row.get::<_, Option<i64>>(14)?.map(UserId),
            created_at: row.get(15)?,
            updated_by: row.get::<_, Option<i64>>(16)?.map(UserId),
            updated_at: row.get(17)?,
        },
    })
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    ///
    /// `busy_timeout` bounds how long a writer waits for another connection's
    /// transaction to finish before failing.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }
}

impl BookingStore for SqliteStore {
    fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking> {
        self.conn.execute(
            "INSERT INTO bookings (
                teacher_id, student_id, grade_id, schedule_date, start_secs, end_secs,
                duration, schedule_type, status, room, notes, is_recurring,
                recurrence_pattern, created_by, created_at, updated_by, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                booking.teacher_id.0,
                booking.student_id.0,
                booking.grade_id.0,
                booking.date,
                secs(booking.slot.start()),
                secs(booking.slot.end()),
                booking.slot.duration_minutes(),
                booking.schedule_type,
                booking.status.as_str(),
                booking.room,
                booking.notes,
                booking.is_recurring,
                booking.recurrence_pattern,
                booking.audit.created_by.map(|u| u.0),
                booking.audit.created_at,
                booking.audit.updated_by.map(|u| u.0),
                booking.audit.updated_at,
            ],
        )?;
        let id = BookingId(self.conn.last_insert_rowid());
        Ok(Booking::with_id(id, booking))
    }

    fn live_bookings_for(&self, party: Party, date: NaiveDate) -> Result<Vec<Booking>> {
        let (column, id) = match party {
            Party::Teacher(id) => ("teacher_id", id.0),
            Party::Student(id) => ("student_id", id.0),
        };
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE {column} = ?1 AND schedule_date = ?2 AND status <> 'Cancelled'
             ORDER BY start_secs"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![id, date], booking_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id.0], booking_from_row)
            .optional()?)
    }

    fn bookings_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE schedule_date >= ?1 AND schedule_date <= ?2
             ORDER BY schedule_date, start_secs, booking_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![from, to], booking_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn scheduled_since(&self, from: NaiveDate) -> Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE status = ?1 AND schedule_date >= ?2
             ORDER BY schedule_date, start_secs, booking_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![BookingStatus::Scheduled.as_str(), from],
            booking_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_booking(&mut self, booking: &Booking) -> Result<()> {
        self.conn.execute(
            "UPDATE bookings SET
                teacher_id = ?2, student_id = ?3, grade_id = ?4, schedule_date = ?5,
                start_secs = ?6, end_secs = ?7, duration = ?8, schedule_type = ?9,
                status = ?10, room = ?11, notes = ?12, is_recurring = ?13,
                recurrence_pattern = ?14, updated_by = ?15, updated_at = ?16
             WHERE booking_id = ?1",
            params![
                booking.id.0,
                booking.teacher_id.0,
                booking.student_id.0,
                booking.grade_id.0,
                booking.date,
                secs(booking.slot.start()),
                secs(booking.slot.end()),
                booking.duration_minutes(),
                booking.schedule_type,
                booking.status.as_str(),
                booking.room,
                booking.notes,
                booking.is_recurring,
                booking.recurrence_pattern,
                booking.audit.updated_by.map(|u| u.0),
                booking.audit.updated_at,
            ],
        )?;
        Ok(())
    }

    fn remove_booking(&mut self, id: BookingId) -> Result<()> {
        self.conn
            .execute("DELETE FROM bookings WHERE booking_id = ?1", [id.0])?;
        Ok(())
    }

    fn attendance(&self, id: AttendanceId) -> Result<Option<Attendance>> {
        let sql =
            format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE attendance_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id.0], attendance_from_row)
            .optional()?)
    }

    fn attendance_for_booking(&self, booking_id: BookingId) -> Result<Option<Attendance>> {
        let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE booking_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [booking_id.0], attendance_from_row)
            .optional()?)
    }

    fn insert_attendance(&mut self, attendance: NewAttendance) -> Result<Attendance> {
        let report = &attendance.report;
        self.conn.execute(
            "INSERT INTO attendances (
                booking_id, student_id, teacher_id, attendance_date, actual_start_secs,
                actual_end_secs, status, lesson_topic, student_progress, teacher_notes,
                homework_assigned, next_lesson_prep, performance_score, created_by,
                created_at, updated_by, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                attendance.booking_id.0,
                attendance.student_id.0,
                attendance.teacher_id.0,
                attendance.date,
                report.actual_start.map(secs),
                report.actual_end.map(secs),
                attendance.status.as_str(),
                report.lesson_topic,
                report.student_progress,
                report.teacher_notes,
                report.homework_assigned,
                report.next_lesson_prep,
                report.performance_score,
                attendance.audit.created_by.map(|u| u.0),
                attendance.audit.created_at,
                attendance.audit.updated_by.map(|u| u.0),
                attendance.audit.updated_at,
            ],
        )?;
        let id = AttendanceId(self.conn.last_insert_rowid());
        Ok(Attendance::with_id(id, attendance))
    }

    fn update_attendance(&mut self, attendance: &Attendance) -> Result<()> {
        let report = &attendance.report;
        self.conn.execute(
            "UPDATE attendances SET
                attendance_date = ?2, actual_start_secs = ?3, actual_end_secs = ?4,
                status = ?5, lesson_topic = ?6, student_progress = ?7, teacher_notes = ?8,
                homework_assigned = ?9, next_lesson_prep = ?10, performance_score = ?11,
                updated_by = ?12, updated_at = ?13
             WHERE attendance_id = ?1",
            params![
                attendance.id.0,
                attendance.date,
                report.actual_start.map(secs),
                report.actual_end.map(secs),
                attendance.status.as_str(),
                report.lesson_topic,
                report.student_progress,
                report.teacher_notes,
                report.homework_assigned,
                report.next_lesson_prep,
                report.performance_score,
                attendance.audit.updated_by.map(|u| u.0),
                attendance.audit.updated_at,
            ],
        )?;
        Ok(())
    }

    fn remove_attendance(&mut self, id: AttendanceId) -> Result<()> {
        self.conn
            .execute("DELETE FROM attendances WHERE attendance_id = ?1", [id.0])?;
        Ok(())
    }

    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        // IMMEDIATE takes the write lock up front, so a second connection blocks
        // (up to the busy timeout) before its own availability check.
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => match self.conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    Err(e.into())
                }
            },
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}
