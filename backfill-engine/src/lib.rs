pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod settings;
pub mod worker;

pub use error::EngineError;
pub use metrics::{MeteredAttemptRepository, Metrics};
pub use scheduler::DeadlineQueue;

use backfill_analytics::{AnalyticsAggregator, DashboardSummary};
use backfill_confirm::{ConfirmationError, ConfirmationService};
use backfill_core::repository::{
    AnalyticsRepository, BookingRepository, ConfirmationRepository, NotificationAttemptRepository,
    RepoError, SlotRepository, WaitlistRepository,
};
use backfill_core::{ChannelProvider, Clock, TemplateRenderer, TimerScheduler};
use backfill_domain::{
    AnalyticsPeriod, AttendanceOutcome, Booking, BookingSource, ConfirmationRequest, ConfirmationState,
    NewBooking, NewWaitlistEntry, NotificationOwner, PeriodKind, SlotDescriptor, SlotHolder, WaitlistEntry,
};
use backfill_notify::NotificationDispatcher;
use backfill_shared::models::events::{
    BackfillBookedEvent, EngineEvent, NotificationFailedEvent, SlotFreedEvent, SlotUnfilledEvent,
    WaitlistMatchedEvent,
};
use backfill_store::app_config::Config;
use backfill_store::{
    InMemoryAnalyticsRepository, InMemoryBookingRepository, InMemoryConfirmationRepository,
    InMemoryNotificationAttemptRepository, InMemorySlotRepository, InMemoryWaitlistRepository,
    PlainTemplateRenderer,
};
use backfill_waitlist::{MatchOutcome, PriorityScorer, WaitlistMatcher};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Storage and outside-world ports the engine is wired to.
#[derive(Clone)]
pub struct Adapters {
    pub bookings: Arc<dyn BookingRepository>,
    pub slots: Arc<dyn SlotRepository>,
    pub confirmations: Arc<dyn ConfirmationRepository>,
    pub waitlist: Arc<dyn WaitlistRepository>,
    pub attempts: Arc<dyn NotificationAttemptRepository>,
    pub periods: Arc<dyn AnalyticsRepository>,
    pub provider: Arc<dyn ChannelProvider>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub clock: Arc<dyn Clock>,
}

impl Adapters {
    /// In-memory stores and the built-in templates around the given provider and clock.
    pub fn in_memory(provider: Arc<dyn ChannelProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bookings: Arc::new(InMemoryBookingRepository::new()),
            slots: Arc::new(InMemorySlotRepository::new()),
            confirmations: Arc::new(InMemoryConfirmationRepository::new()),
            waitlist: Arc::new(InMemoryWaitlistRepository::new()),
            attempts: Arc::new(InMemoryNotificationAttemptRepository::new()),
            periods: Arc::new(InMemoryAnalyticsRepository::new()),
            provider,
            renderer: Arc::new(PlainTemplateRenderer::new()),
            clock,
        }
    }
}

/// Entry point for everything outside the engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    bookings: Arc<dyn BookingRepository>,
    slots: Arc<dyn SlotRepository>,
    clock: Arc<dyn Clock>,
    queue: Arc<DeadlineQueue>,
    dispatcher: Arc<NotificationDispatcher>,
    confirmations: Arc<ConfirmationService>,
    matcher: Arc<WaitlistMatcher>,
    analytics: Arc<AnalyticsAggregator>,
    events: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
    tick_interval: std::time::Duration,
    summary_window_days: i64,
}

impl Engine {
    pub fn new(config: &Config, adapters: Adapters) -> Result<Self, EngineError> {
        let metrics = Metrics::new()?;
        let queue = Arc::new(DeadlineQueue::with_gauge(metrics.pending_timers.clone()));
        let scheduler: Arc<dyn TimerScheduler> = queue.clone();
        let attempts: Arc<dyn NotificationAttemptRepository> =
            Arc::new(MeteredAttemptRepository::new(adapters.attempts.clone(), metrics.clone()));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            adapters.provider.clone(),
            attempts.clone(),
            adapters.confirmations.clone(),
            adapters.waitlist.clone(),
            scheduler.clone(),
            adapters.clock.clone(),
            settings::delivery_policy(config),
        ));
        let confirmations = Arc::new(ConfirmationService::new(
            adapters.bookings.clone(),
            adapters.slots.clone(),
            adapters.confirmations.clone(),
            dispatcher.clone(),
            adapters.renderer.clone(),
            scheduler.clone(),
            adapters.clock.clone(),
            settings::confirmation_policy(config),
        ));
        let matcher = Arc::new(WaitlistMatcher::new(
            adapters.waitlist.clone(),
            adapters.bookings.clone(),
            adapters.slots.clone(),
            dispatcher.clone(),
            adapters.renderer.clone(),
            scheduler,
            adapters.clock.clone(),
            PriorityScorer::new(settings::score_weights(config)),
            settings::response_window(config),
        ));
        let analytics = Arc::new(AnalyticsAggregator::new(
            adapters.bookings.clone(),
            adapters.confirmations.clone(),
            attempts,
            adapters.periods.clone(),
            adapters.clock.clone(),
            settings::notification_costs(config),
            config.analytics.reliability_list_size,
        ));
        let (events, _) = broadcast::channel(config.scheduler.event_buffer.max(1));

        Ok(Self {
            bookings: adapters.bookings,
            slots: adapters.slots,
            clock: adapters.clock,
            queue,
            dispatcher,
            confirmations,
            matcher,
            analytics,
            events,
            metrics,
            tick_interval: std::time::Duration::from_millis(config.scheduler.tick_millis.max(1)),
            summary_window_days: config.analytics.summary_window_days,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn pending_timers(&self) -> usize {
        self.queue.len()
    }

    pub async fn booking(&self, booking_id: Uuid) -> Result<Booking, EngineError> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    pub async fn confirmation(&self, booking_id: Uuid) -> Result<Option<ConfirmationRequest>, EngineError> {
        Ok(self.confirmations.get(booking_id).await?)
    }

    pub async fn waitlist_entry(&self, entry_id: Uuid) -> Result<Option<WaitlistEntry>, EngineError> {
        Ok(self.matcher.get(entry_id).await?)
    }

    /// Take the slot for a new direct booking and arm its confirmation flow.
    pub async fn create_booking(&self, new: NewBooking) -> Result<Booking, EngineError> {
        let now = self.clock.now();
        new.validate(now)?;
        let booking = Booking::new(new, BookingSource::Direct, now);

        // 1. Claim the slot
        let key = booking.key();
        let holder = SlotHolder::Booking(booking.id);
        if !self.slots.claim(&booking.slot(), holder, now).await? {
            tracing::warn!(resource_id = %booking.resource_id, starts_at = %booking.starts_at, "Slot already taken");
            return Err(EngineError::SlotTaken(format!(
                "resource {} at {}",
                booking.resource_id, booking.starts_at
            )));
        }

        // 2. Store the booking, giving the slot back if that fails
        if let Err(e) = self.bookings.insert(&booking).await {
            self.slots.release(key, holder).await?;
            return Err(e.into());
        }

        // 3. Confirmation request and window timer
        let request = self.confirmations.register_booking(&booking, false).await?;
        self.metrics.confirmation_entered(&request.state.to_string());
        tracing::info!(booking_id = %booking.id, salon_id = %booking.salon_id, state = %request.state, "Booking created");

        self.booking(booking.id).await
    }

    /// Open the confirmation window now instead of waiting for its timer.
    pub async fn request_confirmation(&self, booking_id: Uuid) -> Result<ConfirmationRequest, EngineError> {
        let before = self.confirmations.get(booking_id).await?.map(|r| r.state);
        let request = self.confirmations.request_confirmation(booking_id).await?;
        if before != Some(request.state) {
            self.metrics.confirmation_entered(&request.state.to_string());
        }
        self.report_confirmation_failure(&request);
        Ok(request)
    }

    /// The customer confirmed. A confirmation arriving after the deadline
    /// expires the booking on the spot instead of waiting for its timer.
    pub async fn record_confirmation(&self, booking_id: Uuid) -> Result<ConfirmationRequest, EngineError> {
        let before = self.confirmations.get(booking_id).await?.map(|r| r.state);
        match self.confirmations.record_confirmation(booking_id).await {
            Ok(request) => {
                if before != Some(request.state) {
                    self.metrics.confirmation_entered(&request.state.to_string());
                }
                Ok(request)
            }
            Err(err @ ConfirmationError::ConfirmationTooLate { .. }) => {
                if let Some(request) = self.confirmations.get(booking_id).await? {
                    if let (ConfirmationState::AwaitingConfirmation, Some(deadline)) = (request.state, request.expires_at) {
                        self.expire(booking_id, deadline).await?;
                    }
                }
                Err(err.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Customer cancellation. Returns the waitlist entry the freed slot was offered to, if any.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Option<WaitlistEntry>, EngineError> {
        let Some(freed) = self.confirmations.cancel_by_customer(booking_id).await? else {
            return Ok(None);
        };
        self.backfill(freed).await
    }

    pub async fn record_attendance(
        &self,
        booking_id: Uuid,
        outcome: AttendanceOutcome,
    ) -> Result<Booking, EngineError> {
        let booking = self.confirmations.record_attendance(booking_id, outcome).await?;
        let rescored = self.matcher.rescore_customer(booking.customer_id).await?;
        tracing::debug!(customer_id = %booking.customer_id, rescored, "Reliability history changed");
        Ok(booking)
    }

    pub async fn enqueue_waitlist(&self, new: NewWaitlistEntry) -> Result<WaitlistEntry, EngineError> {
        Ok(self.matcher.enqueue(new).await?)
    }

    /// Remove an entry. If it was holding an offer, the slot moves on and
    /// the next candidate (if any) is returned.
    pub async fn dequeue_waitlist(&self, entry_id: Uuid) -> Result<Option<WaitlistEntry>, EngineError> {
        match self.matcher.dequeue(entry_id).await? {
            Some(outcome) => Ok(self.apply_outcome(outcome).await?),
            None => Ok(None),
        }
    }

    /// Offer a freed slot to the best waiting candidate.
    pub async fn on_slot_freed(&self, slot: SlotDescriptor) -> Result<Option<WaitlistEntry>, EngineError> {
        let outcome = self.matcher.on_slot_freed(&slot).await?;
        self.apply_outcome(outcome).await
    }

    /// The candidate takes the slot. The new booking starts out confirmed.
    pub async fn accept_offer(&self, entry_id: Uuid) -> Result<Booking, EngineError> {
        let booking = self.matcher.accept_offer(entry_id).await?;
        match self.confirmations.register_booking(&booking, true).await {
            Ok(request) => {
                self.metrics.waitlist_fills_total.inc();
                self.metrics.confirmation_entered(&request.state.to_string());
                self.publish(EngineEvent::BackfillBooked(BackfillBookedEvent {
                    booking_id: booking.id,
                    entry_id,
                    salon_id: booking.salon_id,
                    price_cents: booking.price_cents,
                    booked_at: self.clock.now(),
                }));
            }
            // Repeated acceptance of the same offer
            Err(ConfirmationError::Repository(RepoError::Duplicate(_))) => {}
            Err(e) => return Err(e.into()),
        }
        self.booking(booking.id).await
    }

    pub async fn decline_offer(&self, entry_id: Uuid) -> Result<Option<WaitlistEntry>, EngineError> {
        let outcome = self.matcher.decline_offer(entry_id).await?;
        self.apply_outcome(outcome).await
    }

    pub async fn expire_stale_entries(&self, salon_id: Uuid) -> Result<usize, EngineError> {
        Ok(self.matcher.expire_stale_entries(salon_id).await?)
    }

    pub async fn rescore_active(&self, salon_id: Uuid) -> Result<usize, EngineError> {
        Ok(self.matcher.rescore_active(salon_id).await?)
    }

    pub async fn generate_analytics(
        &self,
        salon_id: Uuid,
        kind: PeriodKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, EngineError> {
        Ok(self.analytics.generate_for_period(salon_id, kind, start, end).await?)
    }

    /// Generate the period of `kind` containing `instant`.
    pub async fn generate_analytics_containing(
        &self,
        salon_id: Uuid,
        kind: PeriodKind,
        instant: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, EngineError> {
        Ok(self.analytics.generate_containing(salon_id, kind, instant).await?)
    }

    /// Sum of the stored daily periods over the last `window_days` complete days.
    pub async fn dashboard_summary(&self, salon_id: Uuid, window_days: i64) -> Result<DashboardSummary, EngineError> {
        Ok(self.analytics.dashboard_summary(salon_id, window_days).await?)
    }

    /// [`Engine::dashboard_summary`] over the configured window.
    pub async fn recent_summary(&self, salon_id: Uuid) -> Result<DashboardSummary, EngineError> {
        self.dashboard_summary(salon_id, self.summary_window_days).await
    }

    /// Run every timer that is due, including any that come due while
    /// handling them. Returns how many ran.
    pub async fn tick(&self) -> usize {
        let mut handled = 0;
        loop {
            let due = self.queue.pop_due(self.clock.now());
            if due.is_empty() {
                return handled;
            }
            for task in due {
                worker::handle(self, task).await;
                handled += 1;
            }
        }
    }

    /// Drive the deadline queue until `shutdown` flips to `true` or its sender goes away.
    pub async fn run_scheduler(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(tick_millis = self.tick_interval.as_millis() as u64, "Scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for task in self.queue.pop_due(self.clock.now()) {
                        let engine = self.clone();
                        tokio::spawn(async move {
                            worker::handle(&engine, task).await;
                        });
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(pending = self.queue.len(), "Scheduler stopped");
    }

    /// Run the expiry cascade for an overdue confirmation and backfill the slot.
    async fn expire(&self, booking_id: Uuid, deadline: DateTime<Utc>) -> Result<Option<WaitlistEntry>, EngineError> {
        let Some(expiry) = self.confirmations.on_deadline(booking_id, deadline).await? else {
            return Ok(None);
        };
        self.metrics.confirmation_entered(&ConfirmationState::Expired.to_string());
        self.metrics.confirmation_entered(&ConfirmationState::AutoCancelled.to_string());
        self.publish(EngineEvent::ConfirmationExpired(expiry.expired));
        match expiry.freed {
            Some(freed) => self.backfill(freed).await,
            None => Ok(None),
        }
    }

    async fn backfill(&self, freed: SlotFreedEvent) -> Result<Option<WaitlistEntry>, EngineError> {
        let slot = SlotDescriptor::from(&freed);
        self.publish(EngineEvent::SlotFreed(freed));
        let outcome = self.matcher.on_slot_freed(&slot).await?;
        self.apply_outcome(outcome).await
    }

    async fn apply_outcome(&self, outcome: MatchOutcome) -> Result<Option<WaitlistEntry>, EngineError> {
        match outcome {
            MatchOutcome::Offered(entry) => {
                self.metrics.waitlist_offers_total.inc();
                tracing::info!(
                    entry_id = %entry.id,
                    minutes_to_respond = ?entry.minutes_until_match_deadline(self.clock.now()),
                    "Slot offered"
                );
                if let (Some(slot), Some(deadline)) = (&entry.offered_slot, entry.match_deadline) {
                    self.publish(EngineEvent::WaitlistMatched(WaitlistMatchedEvent {
                        entry_id: entry.id,
                        customer_id: entry.customer_id,
                        salon_id: entry.salon_id,
                        resource_id: slot.resource_id,
                        starts_at: slot.starts_at,
                        priority_score: entry.priority_score,
                        match_deadline: deadline,
                    }));
                }
                // Delivery bookkeeping happens after the offer is stored
                let current = self.matcher.get(entry.id).await?.unwrap_or(entry);
                if current.notification_failed {
                    self.publish_notification_failure(
                        NotificationOwner::WaitlistOffer { entry_id: current.id },
                        current.contact.channel.to_string(),
                        1,
                        "offer could not be delivered".to_string(),
                    );
                }
                Ok(Some(current))
            }
            MatchOutcome::Unfilled { slot, candidates_tried } => {
                self.metrics.slots_unfilled_total.inc();
                tracing::warn!(salon_id = %slot.salon_id, starts_at = %slot.starts_at, candidates_tried, "Slot left unfilled");
                self.publish(EngineEvent::SlotUnfilled(SlotUnfilledEvent {
                    salon_id: slot.salon_id,
                    resource_id: slot.resource_id,
                    starts_at: slot.starts_at,
                    candidates_tried,
                    reported_at: self.clock.now(),
                }));
                Ok(None)
            }
            MatchOutcome::NoCandidates | MatchOutcome::AlreadyResolved => Ok(None),
        }
    }

    fn report_confirmation_failure(&self, request: &ConfirmationRequest) {
        if request.permanently_failed {
            self.publish_notification_failure(
                NotificationOwner::Confirmation { booking_id: request.booking_id },
                request.channel.to_string(),
                request.retry_count + 1,
                request.last_error.clone().unwrap_or_default(),
            );
        }
    }

    fn publish_notification_failure(&self, owner: NotificationOwner, channel: String, attempts: u32, cause: String) {
        self.publish(EngineEvent::NotificationFailed(NotificationFailedEvent {
            owner_id: owner.id(),
            owner_kind: owner.kind().to_string(),
            channel,
            attempts,
            cause,
            failed_at: self.clock.now(),
        }));
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
