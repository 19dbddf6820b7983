use crate::notification::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Confirmation lifecycle of one booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationState {
    /// Booking made, confirmation window not open yet
    Scheduled,
    /// Window open, request sent, waiting for the customer
    AwaitingConfirmation,
    Confirmed,
    /// Deadline passed without an answer; always followed by `AutoCancelled`
    Expired,
    AutoCancelled,
    CancelledByCustomer,
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ConfirmationState::Scheduled | ConfirmationState::AwaitingConfirmation
        )
    }
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfirmationState::Scheduled => "scheduled",
            ConfirmationState::AwaitingConfirmation => "awaiting_confirmation",
            ConfirmationState::Confirmed => "confirmed",
            ConfirmationState::Expired => "expired",
            ConfirmationState::AutoCancelled => "auto_cancelled",
            ConfirmationState::CancelledByCustomer => "cancelled_by_customer",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationTrigger {
    WindowOpened,
    CustomerConfirmed,
    DeadlinePassed,
    AutoCancel,
    CustomerCancelled,
}

impl fmt::Display for ConfirmationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    NotSent,
    Sent,
    Delivered,
    Retrying,
    Failed,
}

/// Outreach record for a single booking's confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationRequest {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub salon_id: Uuid,
    pub channel: Channel,
    pub state: ConfirmationState,
    pub window_opens_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Deadline for the customer's answer, set when the window opens
    pub expires_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub delivery_status: DeliveryStatus,
    pub permanently_failed: bool,
    pub last_error: Option<String>,
    pub version: u64,
}

impl ConfirmationRequest {
    pub fn new(booking_id: Uuid, salon_id: Uuid, channel: Channel, window_opens_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            salon_id,
            channel,
            state: ConfirmationState::Scheduled,
            window_opens_at,
            sent_at: None,
            confirmed_at: None,
            expires_at: None,
            expired_at: None,
            resolved_at: None,
            retry_count: 0,
            delivery_status: DeliveryStatus::NotSent,
            permanently_failed: false,
            last_error: None,
            version: 0,
        }
    }

    /// Whole days left before the deadline; negative once it has passed.
    pub fn days_until_deadline(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|deadline| (deadline - now).num_days())
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == ConfirmationState::AwaitingConfirmation
            && self.expires_at.map(|deadline| now >= deadline).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_terminal_states() {
        assert!(!ConfirmationState::Scheduled.is_terminal());
        assert!(!ConfirmationState::AwaitingConfirmation.is_terminal());
        assert!(ConfirmationState::Confirmed.is_terminal());
        assert!(ConfirmationState::Expired.is_terminal());
        assert!(ConfirmationState::AutoCancelled.is_terminal());
        assert!(ConfirmationState::CancelledByCustomer.is_terminal());
    }

    #[test]
    fn test_derived_deadline_fields() {
        let now = Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap();
        let mut request = ConfirmationRequest::new(Uuid::new_v4(), Uuid::new_v4(), Channel::Sms, now);
        assert_eq!(request.days_until_deadline(now), None);

        request.state = ConfirmationState::AwaitingConfirmation;
        request.expires_at = Some(now + Duration::days(2));
        assert_eq!(request.days_until_deadline(now), Some(2));
        assert!(!request.is_overdue(now));
        assert!(request.is_overdue(now + Duration::days(2)));
    }
}
