use chrono::{DateTime, Duration, Utc};

/// When the customer's answer is due.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeadlinePolicy {
    /// Fixed cutoff before the appointment starts
    BeforeAppointment(Duration),
    /// Relative to when the request went out, but never after the start
    AfterReminder(Duration),
}

impl DeadlinePolicy {
    pub fn deadline_for(&self, starts_at: DateTime<Utc>, requested_at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DeadlinePolicy::BeforeAppointment(cutoff) => starts_at - *cutoff,
            DeadlinePolicy::AfterReminder(grace) => (requested_at + *grace).min(starts_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationPolicy {
    /// How long before the appointment the request goes out
    pub window: Duration,
    pub deadline: DeadlinePolicy,
}

impl ConfirmationPolicy {
    pub fn window_opens_at(&self, starts_at: DateTime<Utc>) -> DateTime<Utc> {
        starts_at - self.window
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            window: Duration::hours(24),
            deadline: DeadlinePolicy::BeforeAppointment(Duration::hours(2)),
        }
    }
}
