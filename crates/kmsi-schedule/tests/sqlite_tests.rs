//! Tests for the SQLite store: the same scheduling rules, persisted, plus the
//! guarantees only a shared database can give.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use kmsi_schedule::booking::{Audit, NewBooking};
use kmsi_schedule::{
    AttendanceStatus, BookingDraft, BookingStatus, BookingStore, Conflict, Deletion, GradeId,
    RequestContext, ScheduleError, Scheduler, SlotQuery, SqliteStore, StudentId, TeacherId,
    TimeRange, UserId,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::new(UserId(1), date(2024, 6, 1).and_hms_opt(8, 0, 0).unwrap())
}

fn lesson(
    teacher: i64,
    student: i64,
    day: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> BookingDraft {
    BookingDraft::new(TeacherId(teacher), StudentId(student), GradeId(1), day, start, end)
}

fn in_memory() -> Scheduler<SqliteStore> {
    Scheduler::new(SqliteStore::open_in_memory().expect("in-memory database"))
}

#[test]
fn roundtrips_every_booking_field() {
    let mut scheduler = in_memory();
    let mut draft = lesson(1, 10, date(2024, 6, 3), time(10, 0), time(10, 45));
    draft.schedule_type = "Makeup".to_string();
    draft.room = Some("Room 2".to_string());
    draft.notes = Some("first lesson".to_string());

    let created = scheduler.create(&ctx(), draft).unwrap().booking;
    let loaded = scheduler.get(created.id).unwrap();

    assert_eq!(loaded, created);
    assert_eq!(loaded.duration_minutes(), 45);
    assert_eq!(loaded.schedule_type, "Makeup");
    assert_eq!(loaded.audit.created_by, Some(UserId(1)));
}

#[test]
fn overlap_and_touching_rules_hold_in_sql() {
    let mut scheduler = in_memory();
    let monday = date(2024, 6, 3);
    scheduler
        .create(&ctx(), lesson(1, 10, monday, time(10, 0), time(11, 0)))
        .unwrap();

    let err = scheduler
        .create(&ctx(), lesson(1, 20, monday, time(10, 30), time(11, 30)))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Conflict(Conflict::TeacherUnavailable)));

    scheduler
        .create(&ctx(), lesson(1, 20, monday, time(11, 0), time(12, 0)))
        .expect("touching slot should be bookable");

    let err = scheduler
        .create(&ctx(), lesson(2, 10, monday, time(9, 30), time(10, 15)))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Conflict(Conflict::StudentBooked)));
}

#[test]
fn cancelled_rows_are_ignored_by_conflict_checks() {
    let mut scheduler = in_memory();
    let monday = date(2024, 6, 3);
    let id = scheduler
        .create(&ctx(), lesson(1, 10, monday, time(10, 0), time(11, 0)))
        .unwrap()
        .booking
        .id;

    let outcome = scheduler.delete(&ctx(), id).unwrap();
    assert!(matches!(outcome, Deletion::Cancelled(_)));

    let query = SlotQuery {
        teacher_id: TeacherId(1),
        student_id: StudentId(10),
        date: monday,
        slot: TimeRange::new(time(10, 0), time(11, 0)).unwrap(),
        exclude: None,
    };
    assert!(!scheduler.check_availability(&query).unwrap().has_conflict);
    // The cancelled row is still there for the record.
    assert_eq!(scheduler.list(monday, monday).unwrap().len(), 1);
}

#[test]
fn weekly_projection_persists_surviving_occurrences() {
    let mut scheduler = in_memory();
    scheduler
        .create(&ctx(), lesson(1, 99, date(2024, 6, 17), time(10, 0), time(11, 0)))
        .unwrap();

    let created = scheduler
        .create(
            &ctx(),
            lesson(1, 10, date(2024, 6, 3), time(10, 0), time(11, 0)).recurring("weekly"),
        )
        .unwrap();

    let projection = created.projection.unwrap();
    assert_eq!(projection.created.len(), 3);
    assert_eq!(projection.skipped, vec![date(2024, 6, 17)]);

    let stored = scheduler.list(date(2024, 6, 1), date(2024, 7, 31)).unwrap();
    let dates: Vec<NaiveDate> = stored.iter().map(|b| b.date).collect();
    assert_eq!(
        dates,
        vec![
            date(2024, 6, 3),
            date(2024, 6, 10),
            date(2024, 6, 17),
            date(2024, 6, 24),
            date(2024, 7, 1),
        ]
    );
    assert!(stored
        .iter()
        .filter(|b| b.id != created.booking.id)
        .all(|b| !b.is_recurring && b.status == BookingStatus::Scheduled));
}

#[test]
fn attendance_lifecycle_persists() {
    let mut scheduler = in_memory();
    let day = date(2024, 6, 3);
    let id = scheduler
        .create(&ctx(), lesson(1, 10, day, time(15, 0), time(16, 0)))
        .unwrap()
        .booking
        .id;

    let record = scheduler
        .quick_attendance(&ctx(), id, AttendanceStatus::Present)
        .unwrap();
    assert_eq!(scheduler.get(id).unwrap().status, BookingStatus::Completed);

    let stored = scheduler.store().attendance(record.id).unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(stored.report.actual_start, Some(time(15, 0)));

    let err = scheduler.delete(&ctx(), id).unwrap_err();
    assert!(matches!(err, ScheduleError::HasAttendance));

    scheduler.delete_attendance(&ctx(), record.id).unwrap();
    assert_eq!(scheduler.get(id).unwrap().status, BookingStatus::Scheduled);
}

#[test]
fn pending_attendance_is_queried_in_sql() {
    let mut scheduler = in_memory();
    // ctx() is 2024-06-01, so pending starts on 2024-05-31.
    let before = scheduler
        .create(&ctx(), lesson(1, 10, date(2024, 5, 30), time(10, 0), time(11, 0)))
        .unwrap()
        .booking
        .id;
    let late = scheduler
        .create(&ctx(), lesson(1, 10, date(2024, 6, 3), time(14, 0), time(15, 0)))
        .unwrap()
        .booking
        .id;
    let early = scheduler
        .create(&ctx(), lesson(1, 10, date(2024, 6, 3), time(9, 0), time(10, 0)))
        .unwrap()
        .booking
        .id;
    let edge = scheduler
        .create(&ctx(), lesson(2, 20, date(2024, 5, 31), time(9, 0), time(10, 0)))
        .unwrap()
        .booking
        .id;
    let held = scheduler
        .create(&ctx(), lesson(1, 10, date(2024, 6, 4), time(9, 0), time(10, 0)))
        .unwrap()
        .booking
        .id;
    scheduler
        .quick_attendance(&ctx(), held, AttendanceStatus::Absent)
        .unwrap();

    let pending: Vec<_> = scheduler
        .pending_attendance(&ctx(), None)
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(pending, vec![edge, early, late]);
    assert!(!pending.contains(&before));
}

#[test]
fn attendance_cannot_outlive_its_booking() {
    let mut scheduler = in_memory();
    let day = date(2024, 6, 3);
    let id = scheduler
        .create(&ctx(), lesson(1, 10, day, time(15, 0), time(16, 0)))
        .unwrap()
        .booking
        .id;
    scheduler
        .quick_attendance(&ctx(), id, AttendanceStatus::Absent)
        .unwrap();

    let mut store = scheduler.into_store();
    let err = store.remove_booking(id).unwrap_err();

    assert!(matches!(err, ScheduleError::Sqlite(_)));
    assert!(store.booking(id).unwrap().is_some());
}

#[test]
fn failed_atomic_section_rolls_back() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let day = date(2024, 6, 3);
    let new = NewBooking {
        teacher_id: TeacherId(1),
        student_id: StudentId(10),
        grade_id: GradeId(1),
        date: day,
        slot: TimeRange::new(time(10, 0), time(11, 0)).unwrap(),
        schedule_type: "Regular".to_string(),
        status: BookingStatus::Scheduled,
        room: None,
        notes: None,
        is_recurring: false,
        recurrence_pattern: None,
        audit: Audit::created(UserId(1), ctx().now),
    };

    let result: Result<(), ScheduleError> = store.atomically(|store| {
        store.insert_bookings(vec![new.clone(), new])?;
        Err(ScheduleError::InvalidTimeRange)
    });

    assert!(result.is_err());
    assert!(store.bookings_between(day, day).unwrap().is_empty());
}

#[test]
fn data_survives_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kmsi.sqlite3");
    let day = date(2024, 6, 3);

    let id = {
        let mut scheduler =
            Scheduler::new(SqliteStore::open(&path, Duration::from_secs(5)).unwrap());
        scheduler
            .create(&ctx(), lesson(1, 10, day, time(10, 0), time(11, 0)))
            .unwrap()
            .booking
            .id
    };

    let scheduler = Scheduler::new(SqliteStore::open(&path, Duration::from_secs(5)).unwrap());
    assert_eq!(scheduler.get(id).unwrap().date, day);
}

#[test]
fn concurrent_requests_for_one_slot_book_it_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = Arc::new(dir.path().join("race.sqlite3"));
    // Create the schema up front so all workers start from the same file.
    SqliteStore::open(path.as_path(), Duration::from_secs(5)).unwrap();

    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|n| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = SqliteStore::open(path.as_path(), Duration::from_secs(10)).unwrap();
                let mut scheduler = Scheduler::new(store);
                barrier.wait();
                // Same teacher, different students: only the teacher can clash.
                scheduler.create(
                    &ctx(),
                    lesson(1, 100 + n as i64, date(2024, 6, 3), time(10, 0), time(11, 0)),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let booked = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(ScheduleError::Conflict(Conflict::TeacherUnavailable))))
        .count();

    assert_eq!(booked, 1, "exactly one request may win the slot");
    assert_eq!(refused, workers - 1);
}
