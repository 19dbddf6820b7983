//! Typed policies derived from the loaded [`Config`].

use backfill_analytics::NotificationCosts;
use backfill_confirm::{ConfirmationPolicy, DeadlinePolicy};
use backfill_notify::{BackoffPolicy, DeliveryPolicy};
use backfill_store::app_config::{Config, DeadlinePolicyKind};
use backfill_waitlist::ScoreWeights;
use chrono::Duration;

pub fn confirmation_policy(config: &Config) -> ConfirmationPolicy {
    let deadline_offset = Duration::hours(config.confirmation.deadline_hours);
    let deadline = match config.confirmation.deadline_policy {
        DeadlinePolicyKind::BeforeAppointment => DeadlinePolicy::BeforeAppointment(deadline_offset),
        DeadlinePolicyKind::AfterReminder => DeadlinePolicy::AfterReminder(deadline_offset),
    };
    ConfirmationPolicy {
        window: Duration::hours(config.confirmation.window_hours),
        deadline,
    }
}

pub fn delivery_policy(config: &Config) -> DeliveryPolicy {
    let n = &config.notifications;
    DeliveryPolicy {
        max_attempts: n.max_attempts,
        low_priority_max_attempts: n.low_priority_max_attempts,
        backoff: BackoffPolicy::new(
            Duration::seconds(n.base_backoff_seconds),
            Duration::seconds(n.max_backoff_seconds),
        ),
        send_timeout: std::time::Duration::from_secs(n.send_timeout_seconds),
    }
}

pub fn score_weights(config: &Config) -> ScoreWeights {
    let w = &config.waitlist;
    ScoreWeights {
        wait: w.wait_weight,
        reliability: w.reliability_weight,
        flexibility: w.flexibility_weight,
        wait_saturation: fractional_hours(w.wait_saturation_hours),
        flexibility_saturation: fractional_hours(w.flexibility_saturation_hours),
    }
}

pub fn response_window(config: &Config) -> Duration {
    Duration::minutes(config.waitlist.response_window_minutes)
}

pub fn notification_costs(config: &Config) -> NotificationCosts {
    NotificationCosts {
        sms_cents: config.notifications.sms_cost_cents,
        email_cents: config.notifications.email_cost_cents,
    }
}

fn fractional_hours(hours: f64) -> Duration {
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}
