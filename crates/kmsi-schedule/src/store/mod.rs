//! The persistence collaborator behind the scheduling core.
//!
//! The core never navigates an object graph: every read is a flat query that
//! returns exactly the rows one decision needs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::NaiveDate;

use crate::booking::{
    Attendance, AttendanceId, Booking, BookingId, NewAttendance, NewBooking, Party,
};
use crate::error::Result;

pub trait BookingStore {
    /// Non-cancelled bookings of `party` on `date`.
    fn live_bookings_for(&self, party: Party, date: NaiveDate) -> Result<Vec<Booking>>;

    fn booking(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Every booking dated within `from..=to`, ordered by date then start time.
    fn bookings_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>>;

    /// `Scheduled` bookings dated `from` or later, ordered by date then start time.
    fn scheduled_since(&self, from: NaiveDate) -> Result<Vec<Booking>>;

    fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking>;

    /// Insert all of `bookings`, returning them with their assigned ids.
    fn insert_bookings(&mut self, bookings: Vec<NewBooking>) -> Result<Vec<Booking>> {
        bookings
            .into_iter()
            .map(|booking| self.insert_booking(booking))
            .collect()
    }

    fn update_booking(&mut self, booking: &Booking) -> Result<()>;

    fn remove_booking(&mut self, id: BookingId) -> Result<()>;

    fn attendance(&self, id: AttendanceId) -> Result<Option<Attendance>>;

    fn attendance_for_booking(&self, booking_id: BookingId) -> Result<Option<Attendance>>;

    fn insert_attendance(&mut self, attendance: NewAttendance) -> Result<Attendance>;

    fn update_attendance(&mut self, attendance: &Attendance) -> Result<()>;

    fn remove_attendance(&mut self, id: AttendanceId) -> Result<()>;

    /// Run `f` as one unit: either every write inside it lands or none does, and
    /// no other writer can interleave between its reads and its writes.
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>;
}
