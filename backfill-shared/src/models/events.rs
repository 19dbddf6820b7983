use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotReleaseReason {
    AutoCancelled,
    CustomerCancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SlotFreedEvent {
    pub salon_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_cents: i64,
    /// Booking that held the slot until now
    pub released_by: Uuid,
    pub reason: SlotReleaseReason,
    pub freed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConfirmationExpiredEvent {
    pub booking_id: Uuid,
    pub salon_id: Uuid,
    pub deadline: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WaitlistMatchedEvent {
    pub entry_id: Uuid,
    pub customer_id: Uuid,
    pub salon_id: Uuid,
    pub resource_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub priority_score: f64,
    pub match_deadline: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackfillBookedEvent {
    pub booking_id: Uuid,
    pub entry_id: Uuid,
    pub salon_id: Uuid,
    pub price_cents: i64,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SlotUnfilledEvent {
    pub salon_id: Uuid,
    pub resource_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub candidates_tried: usize,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationFailedEvent {
    /// Booking id for confirmation requests, entry id for waitlist offers
    pub owner_id: Uuid,
    pub owner_kind: String,
    pub channel: String,
    pub attempts: u32,
    pub cause: String,
    pub failed_at: DateTime<Utc>,
}

/// Everything the engine publishes to outside observers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    SlotFreed(SlotFreedEvent),
    ConfirmationExpired(ConfirmationExpiredEvent),
    WaitlistMatched(WaitlistMatchedEvent),
    BackfillBooked(BackfillBookedEvent),
    SlotUnfilled(SlotUnfilledEvent),
    NotificationFailed(NotificationFailedEvent),
}

impl EngineEvent {
    pub fn salon_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::SlotFreed(e) => Some(e.salon_id),
            EngineEvent::ConfirmationExpired(e) => Some(e.salon_id),
            EngineEvent::WaitlistMatched(e) => Some(e.salon_id),
            EngineEvent::BackfillBooked(e) => Some(e.salon_id),
            EngineEvent::SlotUnfilled(e) => Some(e.salon_id),
            EngineEvent::NotificationFailed(_) => None,
        }
    }
}
