use async_trait::async_trait;
use backfill_core::repository::{ConfirmationRepository, RepoError, RepoResult};
use backfill_domain::{ConfirmationRequest, ConfirmationState};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Keyed by booking id: one request per booking.
#[derive(Default)]
pub struct InMemoryConfirmationRepository {
    requests: RwLock<HashMap<Uuid, ConfirmationRequest>>,
}

impl InMemoryConfirmationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfirmationRepository for InMemoryConfirmationRepository {
    async fn insert(&self, request: &ConfirmationRequest) -> RepoResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.booking_id) {
            return Err(RepoError::Duplicate(format!(
                "confirmation for booking {}",
                request.booking_id
            )));
        }
        requests.insert(request.booking_id, request.clone());
        Ok(())
    }

    async fn get_by_booking(&self, booking_id: Uuid) -> RepoResult<Option<ConfirmationRequest>> {
        Ok(self.requests.read().await.get(&booking_id).cloned())
    }

    async fn compare_and_set(
        &self,
        request: &ConfirmationRequest,
        expected: ConfirmationState,
    ) -> RepoResult<Option<ConfirmationRequest>> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.booking_id) {
            Some(current) if current.state == expected && current.version == request.version => {
                let mut next = request.clone();
                next.version += 1;
                *current = next.clone();
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }

    async fn list_for_bookings(&self, booking_ids: &[Uuid]) -> RepoResult<Vec<ConfirmationRequest>> {
        let requests = self.requests.read().await;
        Ok(booking_ids.iter().filter_map(|id| requests.get(id).cloned()).collect())
    }
}
