use crate::booking::{Booking, BookingStatus};
use serde::{Deserialize, Serialize};

/// Attendance history of one customer, derived from their bookings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilityHistory {
    pub completions: u32,
    pub no_shows: u32,
    pub cancellations: u32,
}

impl ReliabilityHistory {
    pub fn from_bookings<'a>(bookings: impl IntoIterator<Item = &'a Booking>) -> Self {
        let mut history = Self::default();
        for booking in bookings {
            match booking.status {
                BookingStatus::Completed => history.completions += 1,
                BookingStatus::NoShow => history.no_shows += 1,
                BookingStatus::Cancelled => history.cancellations += 1,
                BookingStatus::Pending | BookingStatus::Confirmed => {}
            }
        }
        history
    }

    /// Share of attended appointments among those with an outcome, in percent.
    pub fn reliability_percent(&self) -> Option<f64> {
        let outcomes = self.completions + self.no_shows;
        if outcomes == 0 {
            return None;
        }
        Some(f64::from(self.completions) / f64::from(outcomes) * 100.0)
    }
}
