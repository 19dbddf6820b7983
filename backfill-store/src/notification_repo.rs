use async_trait::async_trait;
use backfill_core::repository::{NotificationAttemptRepository, RepoResult};
use backfill_domain::{NotificationAttempt, NotificationOwner};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only; attempts are never edited or removed.
#[derive(Default)]
pub struct InMemoryNotificationAttemptRepository {
    attempts: RwLock<Vec<NotificationAttempt>>,
}

impl InMemoryNotificationAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }
}

#[async_trait]
impl NotificationAttemptRepository for InMemoryNotificationAttemptRepository {
    async fn append(&self, attempt: &NotificationAttempt) -> RepoResult<()> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn list_for_owner(&self, owner: NotificationOwner) -> RepoResult<Vec<NotificationAttempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.owner == owner)
            .cloned()
            .collect())
    }

    async fn list_in_range(
        &self,
        salon_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<NotificationAttempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.salon_id == salon_id && a.created_at >= start && a.created_at < end)
            .cloned()
            .collect())
    }
}
