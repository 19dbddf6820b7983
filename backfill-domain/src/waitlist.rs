use crate::notification::ContactPoint;
use crate::slot::SlotDescriptor;
use crate::DomainError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitlistStatus {
    Active,
    /// Holding an offer (or, once `accepted_booking_id` is set, converted)
    Matched,
    Expired,
    Declined,
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitlistStatus::Active => "ACTIVE",
            WaitlistStatus::Matched => "MATCHED",
            WaitlistStatus::Expired => "EXPIRED",
            WaitlistStatus::Declined => "DECLINED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    /// Above 80 is high, 50 to 80 medium, below 50 low.
    pub fn from_score(score: f64) -> Self {
        if score > 80.0 {
            PriorityTier::High
        } else if score >= 50.0 {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }
}

/// Times the customer could make it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreferredWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl PreferredWindow {
    pub fn contains(&self, slot: &SlotDescriptor) -> bool {
        slot.starts_at >= self.from && slot.ends_at() <= self.to
    }

    pub fn width(&self) -> Duration {
        self.to - self.from
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWaitlistEntry {
    pub salon_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub contact: ContactPoint,
    pub window: PreferredWindow,
}

impl NewWaitlistEntry {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.window.to <= self.window.from {
            return Err(DomainError::Validation(
                "preferred window must end after it starts".to_string(),
            ));
        }
        if self.window.to <= now {
            return Err(DomainError::Validation("preferred window is already over".to_string()));
        }
        if self.contact.address.is_blank() {
            return Err(DomainError::Validation("contact address is required".to_string()));
        }
        Ok(())
    }
}

/// A customer waiting for a slot to open up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub salon_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub contact: ContactPoint,
    pub window: PreferredWindow,
    pub priority_score: f64,
    pub status: WaitlistStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub offered_slot: Option<SlotDescriptor>,
    /// Response deadline for the outstanding offer
    pub match_deadline: Option<DateTime<Utc>>,
    pub accepted_booking_id: Option<Uuid>,
    pub notification_failed: bool,
    pub version: u64,
}

impl WaitlistEntry {
    pub fn new(new: NewWaitlistEntry, priority_score: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            salon_id: new.salon_id,
            service_id: new.service_id,
            customer_id: new.customer_id,
            contact: new.contact,
            window: new.window,
            priority_score,
            status: WaitlistStatus::Active,
            created_at: now,
            updated_at: now,
            offered_slot: None,
            match_deadline: None,
            accepted_booking_id: None,
            notification_failed: false,
            version: 0,
        }
    }

    pub fn tier(&self) -> PriorityTier {
        PriorityTier::from_score(self.priority_score)
    }

    pub fn accepts(&self, slot: &SlotDescriptor) -> bool {
        self.salon_id == slot.salon_id && self.service_id == slot.service_id && self.window.contains(slot)
    }

    /// Holding an offer nobody has answered yet.
    pub fn has_open_offer(&self) -> bool {
        self.status == WaitlistStatus::Matched && self.accepted_booking_id.is_none()
    }

    pub fn minutes_until_match_deadline(&self, now: DateTime<Utc>) -> Option<i64> {
        self.match_deadline.map(|deadline| (deadline - now).num_minutes())
    }

    /// Nothing in the preferred window can be offered any more.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.window.to <= now
    }
}
