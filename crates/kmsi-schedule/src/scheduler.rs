//! Booking operations as the surrounding CRUD layer invokes them.
//!
//! Every operation receives a [`RequestContext`] carrying the acting user and the
//! request's wall-clock time; nothing here reads ambient session state.

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::booking::{
    Attendance, AttendanceDraft, AttendanceId, AttendanceStatus, Audit, Booking, BookingDraft,
    BookingId, BookingStatus, LessonReport, NewAttendance, NewBooking, TeacherId, UserId,
};
use crate::conflict::{check_conflict, Availability, SlotQuery};
use crate::error::{Result, ScheduleError};
use crate::recurrence::{project_recurring, Projection};
use crate::store::BookingStore;

/// Who is acting, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: UserId,
    pub now: NaiveDateTime,
}

impl RequestContext {
    pub fn new(actor: UserId, now: NaiveDateTime) -> Self {
        Self { actor, now }
    }

    /// The civil date the request happens on.
    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Created {
    pub booking: Booking,
    /// Present when the booking was recurring and projection ran to completion.
    pub projection: Option<Projection>,
}

/// What a delete request turned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Deletion {
    /// Today or later: kept, but marked cancelled so its slot is free again.
    Cancelled(Booking),
    /// In the past and never held: physically removed.
    Removed(BookingId),
}

pub struct Scheduler<S> {
    store: S,
}

impl<S: BookingStore> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn check_availability(&self, query: &SlotQuery) -> Result<Availability> {
        Ok(check_conflict(&self.store, query)?.into())
    }

    pub fn get(&self, id: BookingId) -> Result<Booking> {
        self.store.booking(id)?.ok_or(ScheduleError::NotFound(id))
    }

    pub fn list(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>> {
        self.store.bookings_between(from, to)
    }

    /// Classes still waiting for attendance: `Scheduled` bookings dated yesterday
    /// or later, optionally for one teacher, ordered by date then start time.
    pub fn pending_attendance(
        &self,
        ctx: &RequestContext,
        teacher: Option<TeacherId>,
    ) -> Result<Vec<Booking>> {
        let today = ctx.today();
        let from = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let mut pending = self.store.scheduled_since(from)?;
        if let Some(teacher) = teacher {
            pending.retain(|b| b.teacher_id == teacher);
        }
        Ok(pending)
    }

    /// Validate, conflict-check and persist a booking, then project its weekly
    /// occurrences when it is recurring.
    ///
    /// The check and the insert share one atomic store section, so two requests
    /// for the same slot cannot both succeed. Projection runs afterwards in its
    /// own section; its failure is logged and never undoes the base booking.
    ///
    /// # Errors
    /// Returns `ScheduleError::InvalidTimeRange` if the end time is not after the start time.
    /// Returns `ScheduleError::Conflict` if the teacher or the student is already booked.
    /// Returns `ScheduleError::Sqlite` if the store fails.
    pub fn create(&mut self, ctx: &RequestContext, draft: BookingDraft) -> Result<Created> {
        let slot = draft.validate()?;
        let query = SlotQuery {
            teacher_id: draft.teacher_id,
            student_id: draft.student_id,
            date: draft.date,
            slot,
            exclude: None,
        };
        let new = NewBooking {
            teacher_id: draft.teacher_id,
            student_id: draft.student_id,
            grade_id: draft.grade_id,
            date: draft.date,
            slot,
            schedule_type: draft.schedule_type,
            status: draft.status,
            room: draft.room,
            notes: draft.notes,
            is_recurring: draft.is_recurring,
            recurrence_pattern: draft.recurrence_pattern,
            audit: Audit::created(ctx.actor, ctx.now),
        };

        let booking = self.store.atomically(|store| {
            if let Some(conflict) = check_conflict(&*store, &query)? {
                return Err(ScheduleError::Conflict(conflict));
            }
            store.insert_booking(new)
        })?;
        tracing::info!(booking = %booking.id, date = %booking.date, "booking created");

        let wants_projection = booking.is_recurring
            && booking
                .recurrence_pattern
                .as_deref()
                .is_some_and(|p| !p.is_empty());
        let projection = if wants_projection {
            match project_recurring(&mut self.store, &booking, ctx.now) {
                Ok(projection) => Some(projection),
                Err(e) => {
                    tracing::warn!(booking = %booking.id, error = %e, "recurrence projection failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(Created {
            booking,
            projection,
        })
    }

    /// Rewrite an existing booking. The conflict check ignores the booking itself.
    /// Editing never projects new occurrences.
    ///
    /// # Errors
    /// Returns `ScheduleError::NotFound` if no booking has this id.
    /// Returns `ScheduleError::InvalidTimeRange` if the end time is not after the start time.
    /// Returns `ScheduleError::Conflict` if another booking holds the new slot.
    pub fn update(
        &mut self,
        ctx: &RequestContext,
        id: BookingId,
        draft: BookingDraft,
    ) -> Result<Booking> {
        self.store.atomically(|store| {
            let mut booking = store.booking(id)?.ok_or(ScheduleError::NotFound(id))?;
            let slot = draft.validate()?;
            let query = SlotQuery {
                teacher_id: draft.teacher_id,
                student_id: draft.student_id,
                date: draft.date,
                slot,
                exclude: Some(id),
            };
            if let Some(conflict) = check_conflict(&*store, &query)? {
                return Err(ScheduleError::Conflict(conflict));
            }

            booking.teacher_id = draft.teacher_id;
            booking.student_id = draft.student_id;
            booking.grade_id = draft.grade_id;
            booking.date = draft.date;
            booking.slot = slot;
            booking.schedule_type = draft.schedule_type;
            booking.status = draft.status;
            booking.room = draft.room;
            booking.notes = draft.notes;
            booking.is_recurring = draft.is_recurring;
            booking.recurrence_pattern = draft.recurrence_pattern;
            booking.audit.touch(ctx.actor, ctx.now);

            store.update_booking(&booking)?;
            tracing::info!(booking = %id, "booking updated");
            Ok(booking)
        })
    }

    /// Delete a booking, or cancel it when it is today or later.
    ///
    /// Bookings with attendance are never deleted, nor are past completed ones.
    ///
    /// # Errors
    /// Returns `ScheduleError::NotFound` if no booking has this id.
    /// Returns `ScheduleError::HasAttendance` if attendance was recorded for it.
    /// Returns `ScheduleError::CompletedInPast` if it is a completed lesson before today.
    pub fn delete(&mut self, ctx: &RequestContext, id: BookingId) -> Result<Deletion> {
        let today = ctx.today();
        self.store.atomically(|store| {
            let mut booking = store.booking(id)?.ok_or(ScheduleError::NotFound(id))?;

            if store.attendance_for_booking(id)?.is_some() {
                return Err(ScheduleError::HasAttendance);
            }
            if booking.date < today && booking.status == BookingStatus::Completed {
                return Err(ScheduleError::CompletedInPast);
            }

            if booking.date >= today {
                booking.status = BookingStatus::Cancelled;
                booking.audit.touch(ctx.actor, ctx.now);
                store.update_booking(&booking)?;
                tracing::info!(booking = %id, "booking cancelled");
                return Ok(Deletion::Cancelled(booking));
            }

            store.remove_booking(id)?;
            tracing::info!(booking = %id, "booking removed");
            Ok(Deletion::Removed(id))
        })
    }

    /// Record attendance for a booking and move the booking out of `Scheduled`:
    /// `Present` completes it, anything else marks it missed.
    ///
    /// # Errors
    /// Returns `ScheduleError::AttendanceExists` if the booking already has attendance.
    /// Returns `ScheduleError::NotFound` if no booking has this id.
    /// Returns `ScheduleError::NotScheduled` if the booking is completed, missed or cancelled.
    pub fn record_attendance(
        &mut self,
        ctx: &RequestContext,
        booking_id: BookingId,
        draft: AttendanceDraft,
    ) -> Result<Attendance> {
        self.store.atomically(|store| {
            if store.attendance_for_booking(booking_id)?.is_some() {
                return Err(ScheduleError::AttendanceExists);
            }
            let mut booking = store
                .booking(booking_id)?
                .ok_or(ScheduleError::NotFound(booking_id))?;
            if booking.status != BookingStatus::Scheduled {
                return Err(ScheduleError::NotScheduled(booking.status));
            }

            let attendance = store.insert_attendance(NewAttendance {
                booking_id,
                student_id: booking.student_id,
                teacher_id: booking.teacher_id,
                date: draft.date,
                status: draft.status,
                report: draft.report,
                audit: Audit::created(ctx.actor, ctx.now),
            })?;

            booking.status = match draft.status {
                AttendanceStatus::Present => BookingStatus::Completed,
                _ => BookingStatus::Missed,
            };
            booking.audit.touch(ctx.actor, ctx.now);
            store.update_booking(&booking)?;

            tracing::info!(
                booking = %booking_id,
                attendance = %attendance.id,
                status = %attendance.status,
                "attendance recorded"
            );
            Ok(attendance)
        })
    }

    /// One-click attendance: dated on the booking, and when present the actual
    /// times are the booked ones.
    pub fn quick_attendance(
        &mut self,
        ctx: &RequestContext,
        booking_id: BookingId,
        status: AttendanceStatus,
    ) -> Result<Attendance> {
        let booking = self.get(booking_id)?;
        let report = if status == AttendanceStatus::Present {
            LessonReport {
                actual_start: Some(booking.slot.start()),
                actual_end: Some(booking.slot.end()),
                ..LessonReport::default()
            }
        } else {
            LessonReport::default()
        };
        self.record_attendance(
            ctx,
            booking_id,
            AttendanceDraft {
                date: booking.date,
                status,
                report,
            },
        )
    }

    /// Edit an attendance record. `Present` completes the booking and `Absent`
    /// marks it missed; `Late` leaves the booking status as it is.
    ///
    /// # Errors
    /// Returns `ScheduleError::AttendanceNotFound` if no attendance has this id.
    pub fn update_attendance(
        &mut self,
        ctx: &RequestContext,
        id: AttendanceId,
        draft: AttendanceDraft,
    ) -> Result<Attendance> {
        self.store.atomically(|store| {
            let mut attendance = store
                .attendance(id)?
                .ok_or(ScheduleError::AttendanceNotFound(id))?;
            attendance.date = draft.date;
            attendance.status = draft.status;
            attendance.report = draft.report;
            attendance.audit.touch(ctx.actor, ctx.now);
            store.update_attendance(&attendance)?;

            if let Some(mut booking) = store.booking(attendance.booking_id)? {
                match attendance.status {
                    AttendanceStatus::Present => booking.status = BookingStatus::Completed,
                    AttendanceStatus::Absent => booking.status = BookingStatus::Missed,
                    AttendanceStatus::Late => {}
                }
                booking.audit.touch(ctx.actor, ctx.now);
                store.update_booking(&booking)?;
            }
            Ok(attendance)
        })
    }

    /// Remove an attendance record and put its booking back to `Scheduled`.
    pub fn delete_attendance(&mut self, ctx: &RequestContext, id: AttendanceId) -> Result<()> {
        self.store.atomically(|store| {
            let attendance = store
                .attendance(id)?
                .ok_or(ScheduleError::AttendanceNotFound(id))?;
            if let Some(mut booking) = store.booking(attendance.booking_id)? {
                booking.status = BookingStatus::Scheduled;
                booking.audit.touch(ctx.actor, ctx.now);
                store.update_booking(&booking)?;
            }
            store.remove_attendance(id)?;
            tracing::info!(attendance = %id, booking = %attendance.booking_id, "attendance removed");
            Ok(())
        })
    }
}
