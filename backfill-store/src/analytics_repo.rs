use async_trait::async_trait;
use backfill_core::repository::{AnalyticsRepository, RepoResult};
use backfill_domain::{AnalyticsPeriod, PeriodKind};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryAnalyticsRepository {
    periods: RwLock<HashMap<Uuid, AnalyticsPeriod>>,
}

impl InMemoryAnalyticsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalyticsRepository for InMemoryAnalyticsRepository {
    async fn upsert(&self, period: &AnalyticsPeriod) -> RepoResult<()> {
        self.periods.write().await.insert(period.id, period.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<AnalyticsPeriod>> {
        Ok(self.periods.read().await.get(&id).cloned())
    }

    async fn list_in_range(
        &self,
        salon_id: Uuid,
        kind: PeriodKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepoResult<Vec<AnalyticsPeriod>> {
        let periods = self.periods.read().await;
        let mut found: Vec<AnalyticsPeriod> = periods
            .values()
            .filter(|p| p.salon_id == salon_id && p.kind == kind && p.start >= from && p.end <= to)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.start);
        Ok(found)
    }
}
