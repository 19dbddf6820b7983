use backfill_domain::NotificationRequest;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Work the deadline scheduler hands back once its time has come.
///
/// Timers are never cancelled. Handlers re-read the entity and compare the
/// carried deadline with the stored one before acting.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    OpenConfirmationWindow { booking_id: Uuid },
    ConfirmationDeadline { booking_id: Uuid, deadline: DateTime<Utc> },
    OfferResponseDeadline { entry_id: Uuid, deadline: DateTime<Utc> },
    NotificationRetry(Box<NotificationRequest>),
}

impl TimerTask {
    pub fn label(&self) -> &'static str {
        match self {
            TimerTask::OpenConfirmationWindow { .. } => "open_confirmation_window",
            TimerTask::ConfirmationDeadline { .. } => "confirmation_deadline",
            TimerTask::OfferResponseDeadline { .. } => "offer_response_deadline",
            TimerTask::NotificationRetry(_) => "notification_retry",
        }
    }
}

pub trait TimerScheduler: Send + Sync {
    fn schedule(&self, at: DateTime<Utc>, task: TimerTask);
}
