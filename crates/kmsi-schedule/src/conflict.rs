//! Detect double-booking of a teacher or a student.
//!
//! A requested slot conflicts with an existing booking when both fall on the same
//! date and their time ranges overlap. Adjacent bookings (one ends exactly when
//! another starts) are NOT conflicts. Cancelled bookings never conflict: the store
//! only hands back live bookings.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::booking::{Booking, BookingId, BookingStatus, Party, StudentId, TeacherId, TimeRange};
use crate::error::Result;
use crate::store::BookingStore;

/// Which side of a requested booking is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    TeacherUnavailable,
    StudentBooked,
}

impl Conflict {
    /// The message shown to the end user.
    pub fn message(&self) -> &'static str {
        match self {
            Self::TeacherUnavailable => "Teacher is not available at the selected time.",
            Self::StudentBooked => "Student already has a class at the selected time.",
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A slot to test for availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub teacher_id: TeacherId,
    pub student_id: StudentId,
    pub date: NaiveDate,
    pub slot: TimeRange,
    /// Booking to ignore, so an edit never conflicts with itself.
    pub exclude: Option<BookingId>,
}

/// Boolean-plus-message view of a check, as shown to page scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub has_conflict: bool,
    pub message: String,
}

impl From<Option<Conflict>> for Availability {
    fn from(conflict: Option<Conflict>) -> Self {
        match conflict {
            Some(c) => Self {
                has_conflict: true,
                message: c.message().to_string(),
            },
            None => Self {
                has_conflict: false,
                message: String::new(),
            },
        }
    }
}

/// Return the first booking in `bookings` whose range overlaps `slot`, skipping
/// `exclude` and anything cancelled.
pub fn first_overlap<'a>(
    bookings: &'a [Booking],
    slot: &TimeRange,
    exclude: Option<BookingId>,
) -> Option<&'a Booking> {
    bookings.iter().find(|b| {
        Some(b.id) != exclude
            && b.status != BookingStatus::Cancelled
            && b.slot.overlaps(slot)
    })
}

/// Check whether the teacher or the student of `query` is already booked.
///
/// The teacher is checked first; a teacher conflict is reported even when the
/// student is also busy.
pub fn check_conflict<S: BookingStore + ?Sized>(
    store: &S,
    query: &SlotQuery,
) -> Result<Option<Conflict>> {
    let sides = [
        (Party::Teacher(query.teacher_id), Conflict::TeacherUnavailable),
        (Party::Student(query.student_id), Conflict::StudentBooked),
    ];

    for (party, conflict) in sides {
        let bookings = store.live_bookings_for(party, query.date)?;
        if let Some(hit) = first_overlap(&bookings, &query.slot, query.exclude) {
            tracing::debug!(
                booking = %hit.id,
                date = %query.date,
                ?party,
                "slot overlaps existing booking"
            );
            return Ok(Some(conflict));
        }
    }

    Ok(None)
}
