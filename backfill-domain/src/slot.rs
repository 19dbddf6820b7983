use backfill_shared::models::events::{SlotFreedEvent, SlotReleaseReason};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a bookable slot: one resource (chair, room, practitioner) at one start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub salon_id: Uuid,
    pub resource_id: Uuid,
    pub starts_at: DateTime<Utc>,
}

/// Everything the matcher needs to know about a slot that just opened up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    pub salon_id: Uuid,
    pub service_id: Uuid,
    pub resource_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_cents: i64,
}

impl SlotDescriptor {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            salon_id: self.salon_id,
            resource_id: self.resource_id,
            starts_at: self.starts_at,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at + Duration::minutes(self.duration_minutes)
    }

    pub fn freed_event(
        &self,
        released_by: Uuid,
        reason: SlotReleaseReason,
        freed_at: DateTime<Utc>,
    ) -> SlotFreedEvent {
        SlotFreedEvent {
            salon_id: self.salon_id,
            service_id: self.service_id,
            resource_id: self.resource_id,
            starts_at: self.starts_at,
            duration_minutes: self.duration_minutes,
            price_cents: self.price_cents,
            released_by,
            reason,
            freed_at,
        }
    }
}

impl From<&SlotFreedEvent> for SlotDescriptor {
    fn from(event: &SlotFreedEvent) -> Self {
        Self {
            salon_id: event.salon_id,
            service_id: event.service_id,
            resource_id: event.resource_id,
            starts_at: event.starts_at,
            duration_minutes: event.duration_minutes,
            price_cents: event.price_cents,
        }
    }
}

/// Who currently occupies a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotHolder {
    Booking(Uuid),
    /// Held by the waitlist while offers are outstanding
    Waitlist,
}

/// Occupancy record; the only state that needs compare-and-set discipline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotClaim {
    pub key: SlotKey,
    pub ends_at: DateTime<Utc>,
    pub holder: SlotHolder,
    pub claimed_at: DateTime<Utc>,
}

impl SlotClaim {
    /// Same resource and the half-open intervals `[start, end)` intersect.
    pub fn overlaps(&self, key: &SlotKey, ends_at: DateTime<Utc>) -> bool {
        self.key.salon_id == key.salon_id
            && self.key.resource_id == key.resource_id
            && self.key.starts_at < ends_at
            && key.starts_at < self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_descriptor_round_trips_through_event() {
        let slot = SlotDescriptor {
            salon_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            resource_id: Uuid::new_v4(),
            starts_at: Utc.with_ymd_and_hms(2025, 1, 10, 14, 0, 0).unwrap(),
            duration_minutes: 45,
            price_cents: 5000,
        };

        let event = slot.freed_event(Uuid::new_v4(), SlotReleaseReason::AutoCancelled, Utc::now());
        assert_eq!(SlotDescriptor::from(&event), slot);
        assert_eq!(slot.ends_at(), Utc.with_ymd_and_hms(2025, 1, 10, 14, 45, 0).unwrap());
    }

    #[test]
    fn test_claim_overlap_is_half_open() {
        let salon_id = Uuid::new_v4();
        let resource_id = Uuid::new_v4();
        let at = |h: u32, m: u32| Utc.with_ymd_and_hms(2025, 1, 10, h, m, 0).unwrap();
        let key = |starts_at| SlotKey {
            salon_id,
            resource_id,
            starts_at,
        };
        let claim = SlotClaim {
            key: key(at(14, 0)),
            ends_at: at(15, 0),
            holder: SlotHolder::Waitlist,
            claimed_at: at(9, 0),
        };

        assert!(claim.overlaps(&key(at(14, 30)), at(15, 30)));
        assert!(claim.overlaps(&key(at(13, 30)), at(14, 1)));
        // Back to back is fine
        assert!(!claim.overlaps(&key(at(15, 0)), at(16, 0)));
        assert!(!claim.overlaps(&key(at(13, 0)), at(14, 0)));
        // Another chair at the same time is fine too
        let other_chair = SlotKey {
            resource_id: Uuid::new_v4(),
            ..key(at(14, 0))
        };
        assert!(!claim.overlaps(&other_chair, at(15, 0)));
    }
}
