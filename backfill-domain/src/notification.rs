use backfill_shared::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Email,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
            Channel::Email => write!(f, "email"),
        }
    }
}

/// Where and how to reach a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub address: Masked<String>,
    pub channel: Channel,
}

impl ContactPoint {
    pub fn sms(number: &str) -> Self {
        Self {
            address: Masked::from(number),
            channel: Channel::Sms,
        }
    }

    pub fn email(address: &str) -> Self {
        Self {
            address: Masked::from(address),
            channel: Channel::Email,
        }
    }
}

/// The record a notification is sent on behalf of. Failures are written back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationOwner {
    Confirmation { booking_id: Uuid },
    WaitlistOffer { entry_id: Uuid },
    /// Informational messages nobody waits on
    Courtesy { reference_id: Uuid },
}

impl NotificationOwner {
    pub fn id(&self) -> Uuid {
        match self {
            NotificationOwner::Confirmation { booking_id } => *booking_id,
            NotificationOwner::WaitlistOffer { entry_id } => *entry_id,
            NotificationOwner::Courtesy { reference_id } => *reference_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NotificationOwner::Confirmation { .. } => "confirmation",
            NotificationOwner::WaitlistOffer { .. } => "waitlist_offer",
            NotificationOwner::Courtesy { .. } => "courtesy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Normal,
    Low,
}

/// A rendered message plus the bookkeeping needed to retry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Payload reference shared by every attempt of this message
    pub id: Uuid,
    pub salon_id: Uuid,
    pub owner: NotificationOwner,
    pub target: ContactPoint,
    pub body: String,
    pub priority: NotificationPriority,
    /// 1-based number of the attempt this request will perform
    pub attempt: u32,
    /// Deadline of the question this message asks. A retry is dropped once
    /// the owner is waiting on a different deadline.
    #[serde(default)]
    pub reply_by: Option<DateTime<Utc>>,
    /// When the scheduler was told to run this attempt; `None` for the first
    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,
}

impl NotificationRequest {
    pub fn new(
        salon_id: Uuid,
        owner: NotificationOwner,
        target: ContactPoint,
        body: String,
        priority: NotificationPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            salon_id,
            owner,
            target,
            body,
            priority,
            attempt: 1,
            reply_by: None,
            retry_at: None,
        }
    }

    pub fn with_reply_by(mut self, deadline: DateTime<Utc>) -> Self {
        self.reply_by = Some(deadline);
        self
    }

    pub fn next_attempt(&self, retry_at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next.retry_at = Some(retry_at);
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Sent,
    Delivered,
    Failed,
    Bounced,
}

impl AttemptResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptResult::Sent | AttemptResult::Delivered)
    }
}

/// One send try. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: Uuid,
    pub salon_id: Uuid,
    pub owner: NotificationOwner,
    pub target: Masked<String>,
    pub channel: Channel,
    pub payload_ref: Uuid,
    pub attempt: u32,
    pub result: AttemptResult,
    pub error_detail: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub attempt_id: Uuid,
    pub provider_message_id: String,
    pub channel: Channel,
    pub attempt: u32,
    pub result: AttemptResult,
    pub sent_at: DateTime<Utc>,
}
