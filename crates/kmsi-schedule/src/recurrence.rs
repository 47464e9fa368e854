//! Weekly recurrence projection.
//!
//! A recurring booking is expanded into a fixed number of follow-up occurrences
//! through an RFC 5545 `FREQ=WEEKLY` rule. Each occurrence is conflict-checked on
//! its own; occurrences that clash are skipped, never reported as errors.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rrule::RRuleSet;
use serde::Serialize;

use crate::booking::{Audit, Booking, BookingStatus, NewBooking};
use crate::conflict::{check_conflict, SlotQuery};
use crate::error::{Result, ScheduleError};
use crate::store::BookingStore;

/// Follow-up occurrences generated for a weekly booking, not counting the base.
pub const WEEKLY_OCCURRENCES: u16 = 4;

/// The recurrence patterns the projector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrencePattern {
    Weekly,
}

impl RecurrencePattern {
    /// Interpret a free-text pattern. Anything mentioning "weekly", in any case,
    /// is weekly; everything else is not projected.
    pub fn parse(pattern: &str) -> Option<Self> {
        if pattern.to_lowercase().contains("weekly") {
            Some(Self::Weekly)
        } else {
            None
        }
    }
}

/// Outcome of projecting one recurring booking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub created: Vec<Booking>,
    /// Candidate dates dropped because the teacher or student was busy.
    pub skipped: Vec<NaiveDate>,
}

/// Dates of the `occurrences` weekly repeats that follow `base`.
///
/// `start` anchors the rule's DTSTART; it does not affect the dates returned.
///
/// # Errors
/// Returns `ScheduleError::Recurrence` if the rule text does not parse.
pub fn weekly_dates(base: NaiveDate, start: NaiveTime, occurrences: u16) -> Result<Vec<NaiveDate>> {
    if occurrences == 0 {
        return Ok(Vec::new());
    }

    let dtstart = NaiveDateTime::new(base, start).format("%Y%m%dT%H%M%S");
    // COUNT includes DTSTART itself, which is the base booking.
    let total = occurrences.saturating_add(1);
    let rule_text = format!("DTSTART;TZID=UTC:{dtstart}\nRRULE:FREQ=WEEKLY;COUNT={total}");

    let rule_set: RRuleSet = rule_text
        .parse()
        .map_err(|e| ScheduleError::Recurrence(format!("{e}")))?;

    Ok(rule_set
        .all(total)
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .filter(|date| *date > base)
        .take(usize::from(occurrences))
        .collect())
}

/// Project the follow-up occurrences of `base` and persist the conflict-free ones.
///
/// Does nothing unless `base` is flagged recurring with a weekly pattern. Every
/// occurrence copies the base's parties, grade, slot, type, room and notes, is
/// `Scheduled` whatever the base status is, and is never itself recurring. All
/// surviving occurrences are written together; if none survive nothing is written.
///
/// # Errors
/// Returns `ScheduleError::Recurrence` if the weekly rule cannot be built or expanded.
/// Returns `ScheduleError::Sqlite` if a conflict check or the batch insert fails; the
/// batch is then not written.
pub fn project_recurring<S: BookingStore>(
    store: &mut S,
    base: &Booking,
    now: NaiveDateTime,
) -> Result<Projection> {
    let pattern = base
        .recurrence_pattern
        .as_deref()
        .and_then(RecurrencePattern::parse);
    if !base.is_recurring || pattern != Some(RecurrencePattern::Weekly) {
        return Ok(Projection::default());
    }

    let dates = weekly_dates(base.date, base.slot.start(), WEEKLY_OCCURRENCES)?;

    store.atomically(|store| {
        let mut fresh = Vec::new();
        let mut skipped = Vec::new();

        for date in dates {
            let query = SlotQuery {
                teacher_id: base.teacher_id,
                student_id: base.student_id,
                date,
                slot: base.slot,
                exclude: None,
            };
            match check_conflict(&*store, &query)? {
                Some(conflict) => {
                    tracing::debug!(base = %base.id, %date, %conflict, "skipping occurrence");
                    skipped.push(date);
                }
                None => fresh.push(occurrence_of(base, date, now)),
            }
        }

        let created = if fresh.is_empty() {
            Vec::new()
        } else {
            store.insert_bookings(fresh)?
        };

        tracing::info!(
            base = %base.id,
            created = created.len(),
            skipped = skipped.len(),
            "projected weekly occurrences"
        );
        Ok(Projection { created, skipped })
    })
}

fn occurrence_of(base: &Booking, date: NaiveDate, now: NaiveDateTime) -> NewBooking {
    NewBooking {
        teacher_id: base.teacher_id,
        student_id: base.student_id,
        grade_id: base.grade_id,
        date,
        slot: base.slot,
        schedule_type: base.schedule_type.clone(),
        status: BookingStatus::Scheduled,
        room: base.room.clone(),
        notes: base.notes.clone(),
        is_recurring: false,
        recurrence_pattern: None,
        audit: Audit {
            created_by: base.audit.created_by,
            created_at: now,
            updated_by: None,
            updated_at: None,
        },
    }
}
