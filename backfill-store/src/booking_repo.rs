use async_trait::async_trait;
use backfill_core::repository::{BookingRepository, RepoError, RepoResult};
use backfill_domain::{Booking, BookingStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> RepoResult<()> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(RepoError::Duplicate(format!("booking {}", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn compare_and_set(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<Option<Booking>> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&booking.id) {
            Some(current) if current.status == expected && current.version == booking.version => {
                let mut next = booking.clone();
                next.version += 1;
                *current = next.clone();
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }

    async fn list_in_range(
        &self,
        salon_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut found: Vec<Booking> = bookings
            .values()
            .filter(|b| b.salon_id == salon_id && b.starts_at >= start && b.starts_at < end)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut found: Vec<Booking> = bookings
            .values()
            .filter(|b| b.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by_key(|b| b.starts_at);
        Ok(found)
    }
}
