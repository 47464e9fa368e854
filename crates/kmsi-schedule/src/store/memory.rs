//! In-process store backed by ordered maps.
//!
//! Writers are exclusive through `&mut self`; share one store between threads
//! behind a `Mutex`.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::BookingStore;
use crate::booking::{
    Attendance, AttendanceId, Booking, BookingId, BookingStatus, NewAttendance, NewBooking,
    Party,
};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    bookings: BTreeMap<BookingId, Booking>,
    attendances: BTreeMap<AttendanceId, Attendance>,
    next_booking: i64,
    next_attendance: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

impl BookingStore for MemoryStore {
    fn live_bookings_for(&self, party: Party, date: NaiveDate) -> Result<Vec<Booking>> {
        Ok(self
            .bookings
            .values()
            .filter(|b| {
                b.date == date && b.status != BookingStatus::Cancelled && b.involves(party)
            })
            .cloned()
            .collect())
    }

    fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.bookings.get(&id).cloned())
    }

    fn bookings_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .values()
            .filter(|b| b.date >= from && b.date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|b| (b.date, b.slot.start(), b.id));
        Ok(found)
    }

    fn scheduled_since(&self, from: NaiveDate) -> Result<Vec<Booking>> {
        let mut found: Vec<Booking> = self
            .bookings
            .values()
            .filter(|b| b.date >= from && b.status == BookingStatus::Scheduled)
            .cloned()
            .collect();
        found.sort_by_key(|b| (b.date, b.slot.start(), b.id));
        Ok(found)
    }

    fn insert_booking(&mut self, booking: NewBooking) -> Result<Booking> {
        self.next_booking += 1;
        let booking = Booking::with_id(BookingId(self.next_booking), booking);
        self.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn update_booking(&mut self, booking: &Booking) -> Result<()> {
        self.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    fn remove_booking(&mut self, id: BookingId) -> Result<()> {
        self.bookings.remove(&id);
        Ok(())
    }

    fn attendance(&self, id: AttendanceId) -> Result<Option<Attendance>> {
        Ok(self.attendances.get(&id).cloned())
    }

    fn attendance_for_booking(&self, booking_id: BookingId) -> Result<Option<Attendance>> {
        Ok(self
            .attendances
            .values()
            .find(|a| a.booking_id == booking_id)
            .cloned())
    }

    fn insert_attendance(&mut self, attendance: NewAttendance) -> Result<Attendance> {
        self.next_attendance += 1;
        let attendance = Attendance::with_id(AttendanceId(self.next_attendance), attendance);
        self.attendances.insert(attendance.id, attendance.clone());
        Ok(attendance)
    }

    fn update_attendance(&mut self, attendance: &Attendance) -> Result<()> {
        self.attendances.insert(attendance.id, attendance.clone());
        Ok(())
    }

    fn remove_attendance(&mut self, id: AttendanceId) -> Result<()> {
        self.attendances.remove(&id);
        Ok(())
    }

    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}
