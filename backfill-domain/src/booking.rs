use crate::notification::ContactPoint;
use crate::slot::{SlotDescriptor, SlotKey};
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl BookingStatus {
    /// Active bookings occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        match self {
            BookingStatus::Pending => next != BookingStatus::Pending,
            BookingStatus::Confirmed => matches!(
                next,
                BookingStatus::Cancelled | BookingStatus::NoShow | BookingStatus::Completed
            ),
            BookingStatus::Cancelled | BookingStatus::NoShow | BookingStatus::Completed => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::NoShow => "NO_SHOW",
            BookingStatus::Completed => "COMPLETED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingSource {
    Direct,
    Waitlist { entry_id: Uuid },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceOutcome {
    Completed,
    NoShow,
}

impl AttendanceOutcome {
    pub fn status(&self) -> BookingStatus {
        match self {
            AttendanceOutcome::Completed => BookingStatus::Completed,
            AttendanceOutcome::NoShow => BookingStatus::NoShow,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub salon_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub contact: ContactPoint,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_cents: i64,
}

impl NewBooking {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.duration_minutes <= 0 {
            return Err(DomainError::Validation(format!(
                "duration must be positive, got {} minutes",
                self.duration_minutes
            )));
        }
        if self.price_cents < 0 {
            return Err(DomainError::Validation("price cannot be negative".to_string()));
        }
        if self.starts_at <= now {
            return Err(DomainError::Validation("appointment must start in the future".to_string()));
        }
        if self.contact.address.is_blank() {
            return Err(DomainError::Validation("contact address is required".to_string()));
        }
        Ok(())
    }
}

/// One scheduled appointment. Root entity: everything else references it by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub salon_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub contact: ContactPoint,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_cents: i64,
    pub status: BookingStatus,
    pub source: BookingSource,
    pub confirmation_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every successful compare-and-set
    pub version: u64,
}

impl Booking {
    pub fn new(new: NewBooking, source: BookingSource, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            salon_id: new.salon_id,
            customer_id: new.customer_id,
            service_id: new.service_id,
            resource_id: new.resource_id,
            contact: new.contact,
            starts_at: new.starts_at,
            duration_minutes: new.duration_minutes,
            price_cents: new.price_cents,
            status: BookingStatus::Pending,
            source,
            confirmation_deadline: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn slot(&self) -> SlotDescriptor {
        SlotDescriptor {
            salon_id: self.salon_id,
            service_id: self.service_id,
            resource_id: self.resource_id,
            starts_at: self.starts_at,
            duration_minutes: self.duration_minutes,
            price_cents: self.price_cents,
        }
    }

    pub fn key(&self) -> SlotKey {
        self.slot().key()
    }

    pub fn is_waitlist_fill(&self) -> bool {
        matches!(self.source, BookingSource::Waitlist { .. })
    }

    /// Copy with the new status applied, or an error if the move is not allowed.
    pub fn with_status(&self, next: BookingStatus, now: DateTime<Utc>) -> Result<Booking, DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = now;
        Ok(updated)
    }
}
