use async_trait::async_trait;
use backfill_core::repository::{NotificationAttemptRepository, RepoResult};
use backfill_domain::{AttemptResult, NotificationAttempt, NotificationOwner};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use uuid::Uuid;

/// Engine counters, kept in a registry of their own.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub notifications_total: IntCounterVec,
    pub confirmation_transitions_total: IntCounterVec,
    pub waitlist_offers_total: IntCounter,
    pub waitlist_fills_total: IntCounter,
    pub slots_unfilled_total: IntCounter,
    pub pending_timers: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let metrics = Self {
            registry: Arc::new(Registry::new()),
            notifications_total: IntCounterVec::new(
                Opts::new("backfill_notifications_total", "Notification attempts by channel and result"),
                &["channel", "result"],
            )?,
            confirmation_transitions_total: IntCounterVec::new(
                Opts::new(
                    "backfill_confirmation_transitions_total",
                    "Confirmation requests entering each state",
                ),
                &["state"],
            )?,
            waitlist_offers_total: IntCounter::new(
                "backfill_waitlist_offers_total",
                "Offers sent to waitlist candidates",
            )?,
            waitlist_fills_total: IntCounter::new(
                "backfill_waitlist_fills_total",
                "Freed slots rebooked from the waitlist",
            )?,
            slots_unfilled_total: IntCounter::new(
                "backfill_slots_unfilled_total",
                "Freed slots no candidate took",
            )?,
            pending_timers: IntGauge::new("backfill_pending_timers", "Timers waiting in the deadline queue")?,
        };

        metrics.registry.register(Box::new(metrics.notifications_total.clone()))?;
        metrics.registry.register(Box::new(metrics.confirmation_transitions_total.clone()))?;
        metrics.registry.register(Box::new(metrics.waitlist_offers_total.clone()))?;
        metrics.registry.register(Box::new(metrics.waitlist_fills_total.clone()))?;
        metrics.registry.register(Box::new(metrics.slots_unfilled_total.clone()))?;
        metrics.registry.register(Box::new(metrics.pending_timers.clone()))?;

        Ok(metrics)
    }

    pub fn confirmation_entered(&self, state: &str) {
        self.confirmation_transitions_total.with_label_values(&[state]).inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn result_label(result: AttemptResult) -> &'static str {
    match result {
        AttemptResult::Sent => "sent",
        AttemptResult::Delivered => "delivered",
        AttemptResult::Failed => "failed",
        AttemptResult::Bounced => "bounced",
    }
}

/// Counts every attempt on its way into the log.
pub struct MeteredAttemptRepository {
    inner: Arc<dyn NotificationAttemptRepository>,
    metrics: Metrics,
}

impl MeteredAttemptRepository {
    pub fn new(inner: Arc<dyn NotificationAttemptRepository>, metrics: Metrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl NotificationAttemptRepository for MeteredAttemptRepository {
    async fn append(&self, attempt: &NotificationAttempt) -> RepoResult<()> {
        self.inner.append(attempt).await?;
        self.metrics
            .notifications_total
            .with_label_values(&[&attempt.channel.to_string(), result_label(attempt.result)])
            .inc();
        Ok(())
    }

    async fn list_for_owner(&self, owner: NotificationOwner) -> RepoResult<Vec<NotificationAttempt>> {
        self.inner.list_for_owner(owner).await
    }

    async fn list_in_range(
        &self,
        salon_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<NotificationAttempt>> {
        self.inner.list_in_range(salon_id, start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backfill_domain::Channel;
    use backfill_shared::Masked;
    use backfill_store::InMemoryNotificationAttemptRepository;

    fn attempt(result: AttemptResult) -> NotificationAttempt {
        let now = Utc::now();
        NotificationAttempt {
            id: Uuid::new_v4(),
            salon_id: Uuid::new_v4(),
            owner: NotificationOwner::Courtesy { reference_id: Uuid::new_v4() },
            target: Masked("+15550100".to_string()),
            channel: Channel::Sms,
            payload_ref: Uuid::new_v4(),
            attempt: 1,
            result,
            error_detail: None,
            scheduled_for: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_metered_repository_counts_by_channel_and_result() {
        let metrics = Metrics::new().unwrap();
        let repo = MeteredAttemptRepository::new(Arc::new(InMemoryNotificationAttemptRepository::new()), metrics.clone());

        repo.append(&attempt(AttemptResult::Sent)).await.unwrap();
        repo.append(&attempt(AttemptResult::Failed)).await.unwrap();
        repo.append(&attempt(AttemptResult::Failed)).await.unwrap();

        let failed = metrics
            .notifications_total
            .with_label_values(&[&Channel::Sms.to_string(), "failed"])
            .get();
        assert_eq!(failed, 2);
    }

    #[test]
    fn test_render_exposes_registered_families() {
        let metrics = Metrics::new().unwrap();
        metrics.confirmation_entered("EXPIRED");
        metrics.pending_timers.set(4);

        let text = metrics.render().unwrap();
        assert!(text.contains("backfill_confirmation_transitions_total{state=\"EXPIRED\"} 1"));
        assert!(text.contains("backfill_pending_timers 4"));
    }
}
