use crate::machine::transition;
use crate::policy::ConfirmationPolicy;
use crate::ConfirmationError;
use backfill_core::renderer::templates;
use backfill_core::repository::{BookingRepository, ConfirmationRepository, SlotRepository};
use backfill_core::{Clock, TemplateRenderer, TimerScheduler, TimerTask};
use backfill_domain::{
    AttendanceOutcome, Booking, BookingStatus, ConfirmationRequest, ConfirmationState, ConfirmationTrigger,
    NotificationOwner, NotificationPriority, NotificationRequest, SlotHolder,
};
use backfill_notify::{NotificationDispatcher, SendError};
use backfill_shared::models::events::{ConfirmationExpiredEvent, SlotFreedEvent, SlotReleaseReason};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Lost compare-and-set races tolerated before surfacing a conflict.
const CAS_RETRIES: usize = 5;

/// What a fired deadline did.
#[derive(Debug, Clone, PartialEq)]
pub struct Expiry {
    pub expired: ConfirmationExpiredEvent,
    /// `None` if the booking had already left its slot
    pub freed: Option<SlotFreedEvent>,
}

/// Drives one confirmation request per booking through its lifecycle.
pub struct ConfirmationService {
    bookings: Arc<dyn BookingRepository>,
    slots: Arc<dyn SlotRepository>,
    confirmations: Arc<dyn ConfirmationRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    renderer: Arc<dyn TemplateRenderer>,
    scheduler: Arc<dyn TimerScheduler>,
    clock: Arc<dyn Clock>,
    policy: ConfirmationPolicy,
}

impl ConfirmationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        slots: Arc<dyn SlotRepository>,
        confirmations: Arc<dyn ConfirmationRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        renderer: Arc<dyn TemplateRenderer>,
        scheduler: Arc<dyn TimerScheduler>,
        clock: Arc<dyn Clock>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            bookings,
            slots,
            confirmations,
            dispatcher,
            renderer,
            scheduler,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    pub async fn get(&self, booking_id: Uuid) -> Result<Option<ConfirmationRequest>, ConfirmationError> {
        Ok(self.confirmations.get_by_booking(booking_id).await?)
    }

    /// Create the confirmation request for a freshly stored booking.
    ///
    /// Waitlist fills and bookings made after the cutoff start out confirmed;
    /// everything else waits for its window to open.
    pub async fn register_booking(
        &self,
        booking: &Booking,
        pre_confirmed: bool,
    ) -> Result<ConfirmationRequest, ConfirmationError> {
        let now = self.clock.now();
        let opens_at = self.policy.window_opens_at(booking.starts_at);
        let mut request = ConfirmationRequest::new(booking.id, booking.salon_id, booking.contact.channel, opens_at);

        let inside_cutoff = self.policy.deadline.deadline_for(booking.starts_at, now) <= now;
        if pre_confirmed || inside_cutoff {
            request.state = transition(request.state, ConfirmationTrigger::CustomerConfirmed)?;
            request.confirmed_at = Some(now);
            request.resolved_at = Some(now);
            self.confirmations.insert(&request).await?;
            self.mark_booking_confirmed(booking.id, now).await?;
            tracing::info!(booking_id = %booking.id, pre_confirmed, "Booking registered as confirmed");
            return Ok(request);
        }

        self.confirmations.insert(&request).await?;
        self.scheduler.schedule(
            opens_at.max(now),
            TimerTask::OpenConfirmationWindow { booking_id: booking.id },
        );
        tracing::info!(booking_id = %booking.id, %opens_at, "Confirmation window scheduled");
        Ok(request)
    }

    /// Timer entry point. Skips silently if the request moved on in the meantime.
    pub async fn on_window_opened(&self, booking_id: Uuid) -> Result<Option<ConfirmationRequest>, ConfirmationError> {
        let Some(request) = self.confirmations.get_by_booking(booking_id).await? else {
            return Ok(None);
        };
        if request.state != ConfirmationState::Scheduled {
            tracing::debug!(%booking_id, state = %request.state, "Window timer ignored");
            return Ok(None);
        }
        match self.request_confirmation(booking_id).await {
            Ok(request) => Ok(Some(request)),
            Err(ConfirmationError::DeadlineAlreadyPassed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Transition: Scheduled → AwaitingConfirmation (request sent, deadline armed)
    pub async fn request_confirmation(&self, booking_id: Uuid) -> Result<ConfirmationRequest, ConfirmationError> {
        // 1. Load and check
        let booking = self.load_booking(booking_id).await?;
        let request = self.load_request(booking_id).await?;
        match request.state {
            ConfirmationState::Scheduled => {}
            ConfirmationState::AwaitingConfirmation => return Ok(request),
            state => return Err(ConfirmationError::AlreadyResolved { booking_id, state }),
        }
        if !booking.status.is_active() {
            return Err(ConfirmationError::Conflict(format!(
                "booking {} is {}",
                booking_id, booking.status
            )));
        }

        let now = self.clock.now();
        let deadline = self.policy.deadline.deadline_for(booking.starts_at, now);
        if deadline <= now {
            tracing::warn!(%booking_id, %deadline, "Window opened after the deadline");
            return Err(ConfirmationError::DeadlineAlreadyPassed { booking_id, deadline });
        }

        // 2. Move to awaiting
        let mut next = request.clone();
        next.state = transition(request.state, ConfirmationTrigger::WindowOpened)?;
        next.expires_at = Some(deadline);
        let Some(stored) = self
            .confirmations
            .compare_and_set(&next, ConfirmationState::Scheduled)
            .await?
        else {
            let current = self.load_request(booking_id).await?;
            return match current.state {
                ConfirmationState::AwaitingConfirmation => Ok(current),
                state => Err(ConfirmationError::AlreadyResolved { booking_id, state }),
            };
        };
        tracing::info!(%booking_id, %deadline, "Awaiting confirmation");

        // 3. Arm the deadline before anything can fail on the delivery side
        self.scheduler
            .schedule(deadline, TimerTask::ConfirmationDeadline { booking_id, deadline });
        self.record_booking_deadline(booking_id, deadline).await?;

        // 4. Render and hand off to the dispatcher
        let mut vars = BTreeMap::new();
        vars.insert("starts_at".to_string(), display_time(booking.starts_at));
        vars.insert("deadline".to_string(), display_time(deadline));
        vars.insert("booking_id".to_string(), booking_id.to_string());
        let body = self.renderer.render(templates::CONFIRMATION_REQUEST, &vars).await?;

        let message = NotificationRequest::new(
            booking.salon_id,
            NotificationOwner::Confirmation { booking_id },
            booking.contact.clone(),
            body,
            NotificationPriority::Normal,
        )
        .with_reply_by(deadline);
        match self.dispatcher.send(&message).await {
            Ok(_) | Err(SendError::RetryScheduled { .. }) => {}
            Err(SendError::Repository(e)) => return Err(e.into()),
            Err(e) => {
                tracing::error!(%booking_id, error = %e, "Confirmation request not delivered");
            }
        }

        // Delivery bookkeeping may have bumped the version
        Ok(self.confirmations.get_by_booking(booking_id).await?.unwrap_or(stored))
    }

    /// Transition: AwaitingConfirmation → Confirmed (customer action, idempotent)
    pub async fn record_confirmation(&self, booking_id: Uuid) -> Result<ConfirmationRequest, ConfirmationError> {
        for _ in 0..CAS_RETRIES {
            let request = self.load_request(booking_id).await?;
            let now = self.clock.now();
            match request.state {
                ConfirmationState::Confirmed => return Ok(request),
                ConfirmationState::Expired | ConfirmationState::AutoCancelled => {
                    return Err(ConfirmationError::ConfirmationTooLate { booking_id });
                }
                ConfirmationState::CancelledByCustomer => {
                    return Err(ConfirmationError::AlreadyResolved {
                        booking_id,
                        state: request.state,
                    });
                }
                ConfirmationState::AwaitingConfirmation if request.is_overdue(now) => {
                    tracing::warn!(%booking_id, "Confirmation arrived after the deadline");
                    return Err(ConfirmationError::ConfirmationTooLate { booking_id });
                }
                _ => {}
            }

            let mut next = request.clone();
            next.state = transition(request.state, ConfirmationTrigger::CustomerConfirmed)?;
            next.confirmed_at = Some(now);
            next.resolved_at = Some(now);
            if let Some(stored) = self.confirmations.compare_and_set(&next, request.state).await? {
                self.mark_booking_confirmed(booking_id, now).await?;
                tracing::info!(%booking_id, "Booking confirmed by customer");
                return Ok(stored);
            }
            tracing::warn!(%booking_id, "Confirmation raced another update, retrying");
        }
        Err(ConfirmationError::Conflict(format!(
            "confirmation for booking {} kept changing",
            booking_id
        )))
    }

    /// Transition: AwaitingConfirmation → Expired → AutoCancelled
    ///
    /// Returns `None` for stale timers and for races lost to a confirmation.
    pub async fn on_deadline(
        &self,
        booking_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<Option<Expiry>, ConfirmationError> {
        let Some(request) = self.confirmations.get_by_booking(booking_id).await? else {
            return Ok(None);
        };
        if request.state != ConfirmationState::AwaitingConfirmation || request.expires_at != Some(deadline) {
            tracing::debug!(%booking_id, state = %request.state, "Stale deadline timer");
            return Ok(None);
        }
        let now = self.clock.now();
        if now < deadline {
            return Ok(None);
        }

        // 1. Expire; the CAS winner is the only one to free the slot
        let mut expired = request.clone();
        expired.state = transition(request.state, ConfirmationTrigger::DeadlinePassed)?;
        expired.expired_at = Some(now);
        let Some(expired) = self
            .confirmations
            .compare_and_set(&expired, ConfirmationState::AwaitingConfirmation)
            .await?
        else {
            return Ok(None);
        };
        tracing::warn!(%booking_id, %deadline, "Confirmation expired");

        // 2. Cascade
        let mut cancelled = expired.clone();
        cancelled.state = transition(expired.state, ConfirmationTrigger::AutoCancel)?;
        cancelled.resolved_at = Some(now);
        if self
            .confirmations
            .compare_and_set(&cancelled, ConfirmationState::Expired)
            .await?
            .is_none()
        {
            tracing::error!(%booking_id, "Expired request changed before auto-cancel");
        }

        // 3. Free the slot and tell the customer
        let freed = self
            .release_booking(booking_id, SlotReleaseReason::AutoCancelled, now)
            .await?;
        if let Some((booking, _)) = &freed {
            self.send_courtesy(booking, templates::BOOKING_AUTO_CANCELLED).await;
        }

        Ok(Some(Expiry {
            expired: ConfirmationExpiredEvent {
                booking_id,
                salon_id: request.salon_id,
                deadline,
                expired_at: now,
            },
            freed: freed.map(|(_, event)| event),
        }))
    }

    /// Transition: Scheduled | AwaitingConfirmation → CancelledByCustomer
    ///
    /// A booking that was already confirmed keeps its confirmed request; only
    /// the booking itself is cancelled.
    pub async fn cancel_by_customer(&self, booking_id: Uuid) -> Result<Option<SlotFreedEvent>, ConfirmationError> {
        let booking = self.load_booking(booking_id).await?;
        match booking.status {
            BookingStatus::Cancelled => return Ok(None),
            BookingStatus::NoShow | BookingStatus::Completed => {
                return Err(ConfirmationError::Conflict(format!(
                    "booking {} is already {}",
                    booking_id, booking.status
                )));
            }
            BookingStatus::Pending | BookingStatus::Confirmed => {}
        }
        let now = self.clock.now();

        for _ in 0..CAS_RETRIES {
            let Some(request) = self.confirmations.get_by_booking(booking_id).await? else {
                break;
            };
            if request.state.is_terminal() {
                break;
            }
            let mut next = request.clone();
            next.state = transition(request.state, ConfirmationTrigger::CustomerCancelled)?;
            next.resolved_at = Some(now);
            if self.confirmations.compare_and_set(&next, request.state).await?.is_some() {
                break;
            }
        }

        let freed = self
            .release_booking(booking_id, SlotReleaseReason::CustomerCancelled, now)
            .await?;
        if freed.is_some() {
            tracing::info!(%booking_id, "Booking cancelled by customer");
        }
        Ok(freed.map(|(_, event)| event))
    }

    /// Record whether the customer turned up. Only from Pending or Confirmed.
    pub async fn record_attendance(
        &self,
        booking_id: Uuid,
        outcome: AttendanceOutcome,
    ) -> Result<Booking, ConfirmationError> {
        let target = outcome.status();
        for _ in 0..CAS_RETRIES {
            let booking = self.load_booking(booking_id).await?;
            if booking.status == target {
                return Ok(booking);
            }
            let now = self.clock.now();
            let next = booking.with_status(target, now)?;
            if let Some(stored) = self.bookings.compare_and_set(&next, booking.status).await? {
                self.slots.release(stored.key(), SlotHolder::Booking(booking_id)).await?;
                tracing::info!(%booking_id, status = %stored.status, "Attendance recorded");
                return Ok(stored);
            }
        }
        Err(ConfirmationError::Conflict(format!(
            "booking {} kept changing",
            booking_id
        )))
    }

    async fn load_booking(&self, booking_id: Uuid) -> Result<Booking, ConfirmationError> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(ConfirmationError::BookingNotFound(booking_id))
    }

    async fn load_request(&self, booking_id: Uuid) -> Result<ConfirmationRequest, ConfirmationError> {
        self.confirmations
            .get_by_booking(booking_id)
            .await?
            .ok_or(ConfirmationError::RequestNotFound(booking_id))
    }

    async fn mark_booking_confirmed(&self, booking_id: Uuid, now: DateTime<Utc>) -> Result<(), ConfirmationError> {
        for _ in 0..CAS_RETRIES {
            let booking = self.load_booking(booking_id).await?;
            if booking.status != BookingStatus::Pending {
                return Ok(());
            }
            let next = booking.with_status(BookingStatus::Confirmed, now)?;
            if self.bookings.compare_and_set(&next, BookingStatus::Pending).await?.is_some() {
                return Ok(());
            }
        }
        Err(ConfirmationError::Conflict(format!(
            "booking {} kept changing",
            booking_id
        )))
    }

    async fn record_booking_deadline(
        &self,
        booking_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<(), ConfirmationError> {
        for _ in 0..CAS_RETRIES {
            let mut booking = self.load_booking(booking_id).await?;
            if !booking.status.is_active() || booking.confirmation_deadline == Some(deadline) {
                return Ok(());
            }
            let expected = booking.status;
            booking.confirmation_deadline = Some(deadline);
            if self.bookings.compare_and_set(&booking, expected).await?.is_some() {
                return Ok(());
            }
        }
        tracing::warn!(%booking_id, "Could not record deadline on booking");
        Ok(())
    }

    /// Cancel the booking record and give up its slot. `None` if it was no longer active.
    async fn release_booking(
        &self,
        booking_id: Uuid,
        reason: SlotReleaseReason,
        now: DateTime<Utc>,
    ) -> Result<Option<(Booking, SlotFreedEvent)>, ConfirmationError> {
        for _ in 0..CAS_RETRIES {
            let booking = self.load_booking(booking_id).await?;
            if !booking.status.is_active() {
                return Ok(None);
            }
            let cancelled = booking.with_status(BookingStatus::Cancelled, now)?;
            if let Some(stored) = self.bookings.compare_and_set(&cancelled, booking.status).await? {
                if !self.slots.release(stored.key(), SlotHolder::Booking(booking_id)).await? {
                    tracing::warn!(%booking_id, "Slot was not held by this booking");
                }
                let event = stored.slot().freed_event(booking_id, reason, now);
                return Ok(Some((stored, event)));
            }
        }
        Err(ConfirmationError::Conflict(format!(
            "booking {} kept changing",
            booking_id
        )))
    }

    async fn send_courtesy(&self, booking: &Booking, template: &str) {
        let mut vars = BTreeMap::new();
        vars.insert("starts_at".to_string(), display_time(booking.starts_at));
        let body = match self.renderer.render(template, &vars).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(booking_id = %booking.id, error = %e, "Courtesy notice not rendered");
                return;
            }
        };
        let message = NotificationRequest::new(
            booking.salon_id,
            NotificationOwner::Courtesy { reference_id: booking.id },
            booking.contact.clone(),
            body,
            NotificationPriority::Low,
        );
        if let Err(e) = self.dispatcher.send(&message).await {
            tracing::warn!(booking_id = %booking.id, error = %e, "Courtesy notice not sent");
        }
    }
}

fn display_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backfill_core::ProviderError;
    use backfill_domain::{BookingSource, ContactPoint, DeliveryStatus, NewBooking};
    use backfill_notify::DeliveryPolicy;
    use backfill_store::testing::{ManualClock, RecordingScheduler, ScriptedProvider};
    use backfill_store::{
        InMemoryBookingRepository, InMemoryConfirmationRepository, InMemoryNotificationAttemptRepository,
        InMemorySlotRepository, InMemoryWaitlistRepository, PlainTemplateRenderer,
    };
    use chrono::{Duration, TimeZone};

    struct Harness {
        service: ConfirmationService,
        bookings: Arc<InMemoryBookingRepository>,
        slots: Arc<InMemorySlotRepository>,
        scheduler: Arc<RecordingScheduler>,
        clock: Arc<ManualClock>,
        provider: Arc<ScriptedProvider>,
    }

    fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, h, m, s).unwrap()
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let slots = Arc::new(InMemorySlotRepository::new());
        let confirmations = Arc::new(InMemoryConfirmationRepository::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let clock = Arc::new(ManualClock::new(at(5, 10, 0, 0)));
        let provider = Arc::new(provider);
        let dispatcher = Arc::new(NotificationDispatcher::new(
            provider.clone(),
            Arc::new(InMemoryNotificationAttemptRepository::new()),
            confirmations.clone(),
            Arc::new(InMemoryWaitlistRepository::new()),
            scheduler.clone(),
            clock.clone(),
            DeliveryPolicy::default(),
        ));
        let service = ConfirmationService::new(
            bookings.clone(),
            slots.clone(),
            confirmations,
            dispatcher,
            Arc::new(PlainTemplateRenderer::new()),
            scheduler.clone(),
            clock.clone(),
            ConfirmationPolicy::default(),
        );
        Harness {
            service,
            bookings,
            slots,
            scheduler,
            clock,
            provider,
        }
    }

    async fn book(h: &Harness, starts_at: DateTime<Utc>) -> Booking {
        let booking = Booking::new(
            NewBooking {
                salon_id: Uuid::new_v4(),
                customer_id: Uuid::new_v4(),
                service_id: Uuid::new_v4(),
                resource_id: Uuid::new_v4(),
                contact: ContactPoint::sms("+15550009876"),
                starts_at,
                duration_minutes: 60,
                price_cents: 5000,
            },
            BookingSource::Direct,
            h.clock.now(),
        );
        h.bookings.insert(&booking).await.unwrap();
        assert!(h
            .slots
            .claim(&booking.slot(), SlotHolder::Booking(booking.id), h.clock.now())
            .await
            .unwrap());
        booking
    }

    async fn open_window(h: &Harness, booking: &Booking) -> ConfirmationRequest {
        h.service.register_booking(booking, false).await.unwrap();
        h.clock.set(booking.starts_at - Duration::hours(24));
        h.service.on_window_opened(booking.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_unconfirmed_booking_expires_and_frees_slot_once() {
        let h = harness(ScriptedProvider::new());
        let booking = book(&h, at(10, 14, 0, 0)).await;

        h.service.register_booking(&booking, false).await.unwrap();
        assert_eq!(
            h.scheduler.take_due(at(9, 14, 0, 0)),
            vec![TimerTask::OpenConfirmationWindow { booking_id: booking.id }]
        );

        h.clock.set(at(9, 14, 0, 0));
        let request = h.service.on_window_opened(booking.id).await.unwrap().unwrap();
        assert_eq!(request.state, ConfirmationState::AwaitingConfirmation);
        assert_eq!(request.expires_at, Some(at(10, 12, 0, 0)));
        assert_eq!(request.delivery_status, DeliveryStatus::Sent);
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(
            h.bookings.get(booking.id).await.unwrap().unwrap().confirmation_deadline,
            Some(at(10, 12, 0, 0))
        );

        assert!(h.scheduler.take_due(at(10, 11, 59, 59)).is_empty());
        let due = h.scheduler.take_due(at(10, 12, 0, 0));
        assert_eq!(
            due,
            vec![TimerTask::ConfirmationDeadline {
                booking_id: booking.id,
                deadline: at(10, 12, 0, 0)
            }]
        );

        h.clock.set(at(10, 12, 0, 0));
        let expiry = h
            .service
            .on_deadline(booking.id, at(10, 12, 0, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(expiry.expired.expired_at, at(10, 12, 0, 0));
        let freed = expiry.freed.unwrap();
        assert_eq!(freed.reason, SlotReleaseReason::AutoCancelled);
        assert_eq!(freed.starts_at, at(10, 14, 0, 0));

        let stored = h.service.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ConfirmationState::AutoCancelled);
        assert_eq!(stored.expired_at, Some(at(10, 12, 0, 0)));
        assert_eq!(
            h.bookings.get(booking.id).await.unwrap().unwrap().status,
            BookingStatus::Cancelled
        );
        assert_eq!(h.slots.holder(booking.key()).await.unwrap(), None);

        // A duplicate timer does nothing
        assert!(h.service.on_deadline(booking.id, at(10, 12, 0, 0)).await.unwrap().is_none());
        assert!(matches!(
            h.service.record_confirmation(booking.id).await,
            Err(ConfirmationError::ConfirmationTooLate { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_deadline_timers_expire_once() {
        let h = harness(ScriptedProvider::new());
        let booking = book(&h, at(10, 14, 0, 0)).await;
        open_window(&h, &booking).await;
        h.clock.set(at(10, 12, 0, 0));

        let results = futures::future::join_all(
            (0..8).map(|_| h.service.on_deadline(booking.id, at(10, 12, 0, 0))),
        )
        .await;

        let fired = results
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|e| e.as_ref().and_then(|e| e.freed.as_ref()).is_some())
            .count();
        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn test_confirmation_is_idempotent_and_disarms_deadline() {
        let h = harness(ScriptedProvider::new());
        let booking = book(&h, at(10, 14, 0, 0)).await;
        open_window(&h, &booking).await;

        h.clock.set(at(9, 18, 30, 0));
        let first = h.service.record_confirmation(booking.id).await.unwrap();
        let second = h.service.record_confirmation(booking.id).await.unwrap();
        assert_eq!(first.state, ConfirmationState::Confirmed);
        assert_eq!(first.confirmed_at, second.confirmed_at);
        assert_eq!(
            h.bookings.get(booking.id).await.unwrap().unwrap().status,
            BookingStatus::Confirmed
        );

        h.clock.set(at(10, 12, 0, 0));
        assert!(h.service.on_deadline(booking.id, at(10, 12, 0, 0)).await.unwrap().is_none());
        assert!(h.slots.holder(booking.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_late_confirmation_is_rejected() {
        let h = harness(ScriptedProvider::new());
        let booking = book(&h, at(10, 14, 0, 0)).await;
        open_window(&h, &booking).await;

        h.clock.set(at(10, 12, 0, 1));
        let err = h.service.record_confirmation(booking.id).await.unwrap_err();
        assert_eq!(err.to_string(), "This appointment slot is no longer held");
    }

    #[tokio::test]
    async fn test_failed_delivery_still_arms_deadline() {
        let h = harness(ScriptedProvider::failing(
            ProviderError::InvalidAddress("unreachable".to_string()),
            1,
        ));
        let booking = book(&h, at(10, 14, 0, 0)).await;

        let request = open_window(&h, &booking).await;

        assert!(request.permanently_failed);
        assert_eq!(request.state, ConfirmationState::AwaitingConfirmation);
        assert!(h.scheduler.scheduled().iter().any(|(when, task)| {
            *when == at(10, 12, 0, 0) && matches!(task, TimerTask::ConfirmationDeadline { .. })
        }));
    }

    #[tokio::test]
    async fn test_booking_inside_cutoff_is_confirmed_immediately() {
        let h = harness(ScriptedProvider::new());
        h.clock.set(at(10, 12, 30, 0));
        let booking = book(&h, at(10, 14, 0, 0)).await;

        let request = h.service.register_booking(&booking, false).await.unwrap();

        assert_eq!(request.state, ConfirmationState::Confirmed);
        assert!(h.scheduler.scheduled().is_empty());
        assert_eq!(
            h.bookings.get(booking.id).await.unwrap().unwrap().status,
            BookingStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_customer_cancel_frees_slot_once() {
        let h = harness(ScriptedProvider::new());
        let booking = book(&h, at(10, 14, 0, 0)).await;
        open_window(&h, &booking).await;

        let freed = h.service.cancel_by_customer(booking.id).await.unwrap().unwrap();
        assert_eq!(freed.reason, SlotReleaseReason::CustomerCancelled);
        assert!(h.service.cancel_by_customer(booking.id).await.unwrap().is_none());
        assert_eq!(
            h.service.get(booking.id).await.unwrap().unwrap().state,
            ConfirmationState::CancelledByCustomer
        );

        h.clock.set(at(10, 12, 0, 0));
        assert!(h.service.on_deadline(booking.id, at(10, 12, 0, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attendance_is_final() {
        let h = harness(ScriptedProvider::new());
        let booking = book(&h, at(10, 14, 0, 0)).await;
        h.service.register_booking(&booking, true).await.unwrap();

        h.clock.set(at(10, 15, 0, 0));
        let stored = h
            .service
            .record_attendance(booking.id, AttendanceOutcome::NoShow)
            .await
            .unwrap();
        assert_eq!(stored.status, BookingStatus::NoShow);
        assert!(matches!(
            h.service.record_attendance(booking.id, AttendanceOutcome::Completed).await,
            Err(ConfirmationError::Domain(_))
        ));
    }
}
