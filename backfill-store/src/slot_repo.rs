use async_trait::async_trait;
use backfill_core::repository::{RepoResult, SlotRepository};
use backfill_domain::{SlotClaim, SlotDescriptor, SlotHolder, SlotKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Occupancy table keyed by start time. Every operation runs under one lock,
/// which is what makes `claim` behave like `SET NX` over time ranges.
#[derive(Default)]
pub struct InMemorySlotRepository {
    claims: Mutex<HashMap<SlotKey, SlotClaim>>,
}

impl InMemorySlotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotRepository for InMemorySlotRepository {
    async fn claim(&self, slot: &SlotDescriptor, holder: SlotHolder, at: DateTime<Utc>) -> RepoResult<bool> {
        let key = slot.key();
        let ends_at = slot.ends_at();
        let mut claims = self.claims.lock().await;
        if claims.values().any(|c| c.overlaps(&key, ends_at)) {
            return Ok(false);
        }
        claims.insert(
            key,
            SlotClaim {
                key,
                ends_at,
                holder,
                claimed_at: at,
            },
        );
        Ok(true)
    }

    async fn transfer(&self, key: SlotKey, from: SlotHolder, to: SlotHolder, at: DateTime<Utc>) -> RepoResult<bool> {
        let mut claims = self.claims.lock().await;
        match claims.get_mut(&key) {
            Some(claim) if claim.holder == from => {
                claim.holder = to;
                claim.claimed_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: SlotKey, holder: SlotHolder) -> RepoResult<bool> {
        let mut claims = self.claims.lock().await;
        match claims.get(&key) {
            Some(claim) if claim.holder == holder => {
                claims.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn holder(&self, key: SlotKey) -> RepoResult<Option<SlotHolder>> {
        Ok(self.claims.lock().await.get(&key).map(|c| c.holder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use uuid::Uuid;

    fn slot() -> SlotDescriptor {
        SlotDescriptor {
            salon_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            starts_at: Utc::now(),
            duration_minutes: 60,
            price_cents: 4500,
        }
    }

    #[tokio::test]
    async fn test_only_one_concurrent_claim_wins() {
        let repo = Arc::new(InMemorySlotRepository::new());
        let slot = slot();
        let now = Utc::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let repo = repo.clone();
                let slot = slot.clone();
                tokio::spawn(async move { repo.claim(&slot, SlotHolder::Booking(Uuid::new_v4()), now).await })
            })
            .collect();

        let mut wins = 0;
        for h in handles {
            if h.await.unwrap().unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_overlapping_claim_on_same_resource_is_refused() {
        let repo = InMemorySlotRepository::new();
        let first = slot();
        let now = Utc::now();
        assert!(repo.claim(&first, SlotHolder::Booking(Uuid::new_v4()), now).await.unwrap());

        let half_past = SlotDescriptor {
            starts_at: first.starts_at + Duration::minutes(30),
            ..first.clone()
        };
        assert!(!repo.claim(&half_past, SlotHolder::Booking(Uuid::new_v4()), now).await.unwrap());
        assert_eq!(repo.holder(half_past.key()).await.unwrap(), None);

        let next_hour = SlotDescriptor {
            starts_at: first.ends_at(),
            ..first.clone()
        };
        assert!(repo.claim(&next_hour, SlotHolder::Waitlist, now).await.unwrap());

        let other_chair = SlotDescriptor {
            resource_id: Uuid::new_v4(),
            ..half_past
        };
        assert!(repo.claim(&other_chair, SlotHolder::Waitlist, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_transfer_and_release_check_holder() {
        let repo = InMemorySlotRepository::new();
        let slot = slot();
        let key = slot.key();
        let now = Utc::now();
        let booking = SlotHolder::Booking(Uuid::new_v4());

        assert!(repo.claim(&slot, SlotHolder::Waitlist, now).await.unwrap());
        assert!(!repo.release(key, booking).await.unwrap());
        assert!(repo.transfer(key, SlotHolder::Waitlist, booking, now).await.unwrap());
        assert!(!repo.transfer(key, SlotHolder::Waitlist, booking, now).await.unwrap());
        assert_eq!(repo.holder(key).await.unwrap(), Some(booking));
        assert!(repo.release(key, booking).await.unwrap());
        assert_eq!(repo.holder(key).await.unwrap(), None);
    }
}
