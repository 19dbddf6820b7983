use async_trait::async_trait;
use backfill_core::repository::{RepoError, RepoResult, WaitlistRepository};
use backfill_domain::{WaitlistEntry, WaitlistStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryWaitlistRepository {
    entries: RwLock<HashMap<Uuid, WaitlistEntry>>,
}

impl InMemoryWaitlistRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select(&self, pred: impl Fn(&WaitlistEntry) -> bool) -> Vec<WaitlistEntry> {
        let entries = self.entries.read().await;
        let mut found: Vec<WaitlistEntry> = entries.values().filter(|e| pred(e)).cloned().collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found
    }
}

#[async_trait]
impl WaitlistRepository for InMemoryWaitlistRepository {
    async fn insert(&self, entry: &WaitlistEntry) -> RepoResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.id) {
            return Err(RepoError::Duplicate(format!("waitlist entry {}", entry.id)));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<WaitlistEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn compare_and_set(
        &self,
        entry: &WaitlistEntry,
        expected: WaitlistStatus,
    ) -> RepoResult<Option<WaitlistEntry>> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&entry.id) {
            Some(current) if current.status == expected && current.version == entry.version => {
                let mut next = entry.clone();
                next.version += 1;
                *current = next.clone();
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }

    async fn remove_if(&self, entry: &WaitlistEntry, expected: WaitlistStatus) -> RepoResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get(&entry.id) {
            Some(current) if current.status == expected && current.version == entry.version => {
                entries.remove(&entry.id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active(&self, salon_id: Uuid, service_id: Uuid) -> RepoResult<Vec<WaitlistEntry>> {
        Ok(self
            .select(|e| {
                e.salon_id == salon_id && e.service_id == service_id && e.status == WaitlistStatus::Active
            })
            .await)
    }

    async fn list_active_for_salon(&self, salon_id: Uuid) -> RepoResult<Vec<WaitlistEntry>> {
        Ok(self
            .select(|e| e.salon_id == salon_id && e.status == WaitlistStatus::Active)
            .await)
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<WaitlistEntry>> {
        Ok(self.select(|e| e.customer_id == customer_id).await)
    }
}
