use async_trait::async_trait;
use backfill_domain::{
    AnalyticsPeriod, Booking, BookingStatus, ConfirmationRequest, ConfirmationState,
    NotificationAttempt, NotificationOwner, PeriodKind, SlotDescriptor, SlotHolder, SlotKey,
    WaitlistEntry, WaitlistStatus,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RepoError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Compare-and-set methods only write when the stored record still has the
/// expected status *and* the version the caller read. On success the store
/// bumps the version and returns the record as stored; `Ok(None)` means
/// another writer got there first.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>>;

    async fn compare_and_set(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<Option<Booking>>;

    /// Bookings whose appointment starts in `[start, end)`
    async fn list_in_range(
        &self,
        salon_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<Booking>>;

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<Booking>>;
}

/// Occupancy records. The single resource guarded by strict mutual exclusion.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Take a free slot. `false` if anybody holds a slot on the same resource
    /// whose time range overlaps this one.
    async fn claim(&self, slot: &SlotDescriptor, holder: SlotHolder, at: DateTime<Utc>) -> RepoResult<bool>;

    /// Hand the slot from `from` to `to`. `false` if `from` no longer holds it.
    async fn transfer(&self, key: SlotKey, from: SlotHolder, to: SlotHolder, at: DateTime<Utc>) -> RepoResult<bool>;

    /// Free the slot if `holder` still holds it.
    async fn release(&self, key: SlotKey, holder: SlotHolder) -> RepoResult<bool>;

    async fn holder(&self, key: SlotKey) -> RepoResult<Option<SlotHolder>>;
}

#[async_trait]
pub trait ConfirmationRepository: Send + Sync {
    async fn insert(&self, request: &ConfirmationRequest) -> RepoResult<()>;

    async fn get_by_booking(&self, booking_id: Uuid) -> RepoResult<Option<ConfirmationRequest>>;

    async fn compare_and_set(
        &self,
        request: &ConfirmationRequest,
        expected: ConfirmationState,
    ) -> RepoResult<Option<ConfirmationRequest>>;

    async fn list_for_bookings(&self, booking_ids: &[Uuid]) -> RepoResult<Vec<ConfirmationRequest>>;
}

#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    async fn insert(&self, entry: &WaitlistEntry) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<WaitlistEntry>>;

    async fn compare_and_set(
        &self,
        entry: &WaitlistEntry,
        expected: WaitlistStatus,
    ) -> RepoResult<Option<WaitlistEntry>>;

    /// Delete the entry if it is still in `expected` status at the version read.
    async fn remove_if(&self, entry: &WaitlistEntry, expected: WaitlistStatus) -> RepoResult<bool>;

    async fn list_active(&self, salon_id: Uuid, service_id: Uuid) -> RepoResult<Vec<WaitlistEntry>>;

    async fn list_active_for_salon(&self, salon_id: Uuid) -> RepoResult<Vec<WaitlistEntry>>;

    async fn list_for_customer(&self, customer_id: Uuid) -> RepoResult<Vec<WaitlistEntry>>;
}

/// Append-only attempt log.
#[async_trait]
pub trait NotificationAttemptRepository: Send + Sync {
    async fn append(&self, attempt: &NotificationAttempt) -> RepoResult<()>;

    async fn list_for_owner(&self, owner: NotificationOwner) -> RepoResult<Vec<NotificationAttempt>>;

    /// Attempts created in `[start, end)`
    async fn list_in_range(
        &self,
        salon_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RepoResult<Vec<NotificationAttempt>>;
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Store the period, superseding any previous snapshot with the same id.
    async fn upsert(&self, period: &AnalyticsPeriod) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<AnalyticsPeriod>>;

    /// Periods of `kind` lying entirely inside `[from, to)`, oldest first
    async fn list_in_range(
        &self,
        salon_id: Uuid,
        kind: PeriodKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepoResult<Vec<AnalyticsPeriod>>;
}
