use crate::scoring::{rank, PriorityScorer};
use crate::MatchError;
use backfill_core::renderer::templates;
use backfill_core::repository::{BookingRepository, SlotRepository, WaitlistRepository};
use backfill_core::{Clock, TemplateRenderer, TimerScheduler, TimerTask};
use backfill_domain::{
    Booking, BookingSource, NewBooking, NewWaitlistEntry, NotificationOwner, NotificationPriority,
    NotificationRequest, ReliabilityHistory, SlotDescriptor, SlotHolder, SlotKey, WaitlistEntry,
    WaitlistStatus,
};
use backfill_notify::{NotificationDispatcher, SendError};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result of trying to place a freed slot.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// An offer went out to this entry
    Offered(WaitlistEntry),
    /// Nobody on the waitlist fits; the slot was left open
    NoCandidates,
    /// Every fitting candidate was tried; the slot was released
    Unfilled { slot: SlotDescriptor, candidates_tried: usize },
    /// Another caller already owns this slot
    AlreadyResolved,
}

impl MatchOutcome {
    pub fn offered(&self) -> Option<&WaitlistEntry> {
        match self {
            MatchOutcome::Offered(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Owns the waitlist and hands each freed slot to at most one candidate at a time.
pub struct WaitlistMatcher {
    waitlist: Arc<dyn WaitlistRepository>,
    bookings: Arc<dyn BookingRepository>,
    slots: Arc<dyn SlotRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    renderer: Arc<dyn TemplateRenderer>,
    scheduler: Arc<dyn TimerScheduler>,
    clock: Arc<dyn Clock>,
    scorer: PriorityScorer,
    response_window: Duration,
    /// Per freed slot, the entries already asked in this cascade
    rounds: Mutex<HashMap<SlotKey, HashSet<Uuid>>>,
}

impl WaitlistMatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        waitlist: Arc<dyn WaitlistRepository>,
        bookings: Arc<dyn BookingRepository>,
        slots: Arc<dyn SlotRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        renderer: Arc<dyn TemplateRenderer>,
        scheduler: Arc<dyn TimerScheduler>,
        clock: Arc<dyn Clock>,
        scorer: PriorityScorer,
        response_window: Duration,
    ) -> Self {
        Self {
            waitlist,
            bookings,
            slots,
            dispatcher,
            renderer,
            scheduler,
            clock,
            scorer,
            response_window,
            rounds: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, entry_id: Uuid) -> Result<Option<WaitlistEntry>, MatchError> {
        Ok(self.waitlist.get(entry_id).await?)
    }

    /// Priority score from the customer's attendance history at this salon.
    pub async fn score(&self, entry: &WaitlistEntry) -> Result<f64, MatchError> {
        let history = self.history(entry.salon_id, entry.customer_id).await?;
        Ok(self.scorer.score(entry, &history, self.clock.now()))
    }

    pub async fn enqueue(&self, new: NewWaitlistEntry) -> Result<WaitlistEntry, MatchError> {
        let now = self.clock.now();
        new.validate(now)?;

        let mut entry = WaitlistEntry::new(new, 0.0, now);
        entry.priority_score = self.score(&entry).await?;
        self.waitlist.insert(&entry).await?;

        tracing::info!(
            entry_id = %entry.id,
            salon_id = %entry.salon_id,
            score = entry.priority_score,
            tier = ?entry.tier(),
            "Added to waitlist"
        );
        Ok(entry)
    }

    /// Take an entry off the waitlist. An open offer is declined first so the
    /// slot moves on to the next candidate.
    pub async fn dequeue(&self, entry_id: Uuid) -> Result<Option<MatchOutcome>, MatchError> {
        let mut cascade = None;
        let mut entry = self.load(entry_id).await?;
        if entry.has_open_offer() {
            cascade = Some(self.decline_offer(entry_id).await?);
            entry = self.load(entry_id).await?;
        }
        if !self.waitlist.remove_if(&entry, entry.status).await? {
            return Err(MatchError::Conflict(format!(
                "waitlist entry {} changed while being removed",
                entry_id
            )));
        }
        tracing::info!(%entry_id, "Removed from waitlist");
        Ok(cascade)
    }

    /// Claim the freed slot for the waitlist and offer it to the best candidate.
    pub async fn on_slot_freed(&self, slot: &SlotDescriptor) -> Result<MatchOutcome, MatchError> {
        let now = self.clock.now();
        if slot.starts_at <= now {
            return Ok(MatchOutcome::NoCandidates);
        }

        // 1. One winner per freed slot
        let key = slot.key();
        if !self.slots.claim(slot, SlotHolder::Waitlist, now).await? {
            tracing::debug!(salon_id = %slot.salon_id, starts_at = %slot.starts_at, "Slot already taken");
            return Ok(MatchOutcome::AlreadyResolved);
        }
        self.rounds.lock().await.insert(key, HashSet::new());

        // 2. Cascade through candidates
        self.offer_next(slot).await
    }

    /// The customer takes the slot: a waitlist-sourced booking is created and
    /// the slot passes from the waitlist to it.
    pub async fn accept_offer(&self, entry_id: Uuid) -> Result<Booking, MatchError> {
        let entry = self.load(entry_id).await?;
        if let Some(booking_id) = entry.accepted_booking_id {
            return self
                .bookings
                .get(booking_id)
                .await?
                .ok_or_else(|| MatchError::Conflict(format!("accepted booking {} is missing", booking_id)));
        }
        let (slot, deadline) = match (&entry.offered_slot, entry.match_deadline) {
            (Some(slot), Some(deadline)) if entry.status == WaitlistStatus::Matched => (slot.clone(), deadline),
            _ => {
                return Err(MatchError::NoOpenOffer {
                    entry_id,
                    status: entry.status,
                })
            }
        };
        let now = self.clock.now();
        if now >= deadline || now >= slot.starts_at {
            tracing::warn!(%entry_id, %deadline, starts_at = %slot.starts_at, "Offer accepted too late");
            return Err(MatchError::OfferExpired { entry_id });
        }

        let booking = Booking::new(
            NewBooking {
                salon_id: slot.salon_id,
                customer_id: entry.customer_id,
                service_id: slot.service_id,
                resource_id: slot.resource_id,
                contact: entry.contact.clone(),
                starts_at: slot.starts_at,
                duration_minutes: slot.duration_minutes,
                price_cents: slot.price_cents,
            },
            BookingSource::Waitlist { entry_id },
            now,
        );

        // 1. Pin the acceptance on the entry; this is what beats a racing timeout
        let mut accepted = entry.clone();
        accepted.accepted_booking_id = Some(booking.id);
        accepted.updated_at = now;
        let Some(pinned) = self
            .waitlist
            .compare_and_set(&accepted, WaitlistStatus::Matched)
            .await?
        else {
            return Err(MatchError::OfferExpired { entry_id });
        };

        // 2. Hand the slot over, unpinning if it is gone
        let key = slot.key();
        if !self
            .slots
            .transfer(key, SlotHolder::Waitlist, SlotHolder::Booking(booking.id), now)
            .await?
        {
            tracing::error!(%entry_id, starts_at = %slot.starts_at, "Accepted slot no longer held by the waitlist");
            let mut unpinned = pinned;
            unpinned.accepted_booking_id = None;
            unpinned.updated_at = now;
            if self
                .waitlist
                .compare_and_set(&unpinned, WaitlistStatus::Matched)
                .await?
                .is_none()
            {
                tracing::warn!(%entry_id, "Entry changed while undoing acceptance");
            }
            return Err(MatchError::Conflict("slot is no longer held for this offer".to_string()));
        }
        self.bookings.insert(&booking).await?;
        self.rounds.lock().await.remove(&key);

        tracing::info!(%entry_id, booking_id = %booking.id, "Waitlist offer accepted");
        Ok(booking)
    }

    /// Transition: Matched → Declined, then the next candidate is asked.
    pub async fn decline_offer(&self, entry_id: Uuid) -> Result<MatchOutcome, MatchError> {
        let entry = self.load(entry_id).await?;
        let Some(slot) = entry.offered_slot.clone().filter(|_| entry.has_open_offer()) else {
            return Err(MatchError::NoOpenOffer {
                entry_id,
                status: entry.status,
            });
        };

        let mut declined = entry.clone();
        declined.status = WaitlistStatus::Declined;
        declined.match_deadline = None;
        declined.updated_at = self.clock.now();
        if self
            .waitlist
            .compare_and_set(&declined, WaitlistStatus::Matched)
            .await?
            .is_none()
        {
            return Err(MatchError::Conflict(format!("offer to {} already resolved", entry_id)));
        }
        tracing::info!(%entry_id, "Waitlist offer declined");

        self.offer_next(&slot).await
    }

    /// Timer entry point for an unanswered offer. The entry goes back to the
    /// waitlist with a fresh score and the slot moves on.
    pub async fn on_offer_timeout(
        &self,
        entry_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<Option<MatchOutcome>, MatchError> {
        let Some(entry) = self.waitlist.get(entry_id).await? else {
            return Ok(None);
        };
        if !entry.has_open_offer() || entry.match_deadline != Some(deadline) {
            tracing::debug!(%entry_id, "Stale offer timer");
            return Ok(None);
        }
        let now = self.clock.now();
        if now < deadline {
            return Ok(None);
        }
        let Some(slot) = entry.offered_slot.clone() else {
            return Ok(None);
        };

        let mut reverted = entry.clone();
        reverted.status = WaitlistStatus::Active;
        reverted.offered_slot = None;
        reverted.match_deadline = None;
        reverted.updated_at = now;
        reverted.priority_score = self.score(&entry).await?;
        let Some(reverted) = self
            .waitlist
            .compare_and_set(&reverted, WaitlistStatus::Matched)
            .await?
        else {
            return Ok(None);
        };
        tracing::warn!(%entry_id, score = reverted.priority_score, "Offer lapsed, entry back on the waitlist");

        self.send_offer_message(&reverted, &slot, templates::WAITLIST_OFFER_LAPSED, None)
            .await;
        self.offer_next(&slot).await.map(Some)
    }

    /// Active entries whose preferred window is over become `Expired`.
    pub async fn expire_stale_entries(&self, salon_id: Uuid) -> Result<usize, MatchError> {
        let now = self.clock.now();
        let mut expired = 0;
        for entry in self.waitlist.list_active_for_salon(salon_id).await? {
            if !entry.is_stale(now) {
                continue;
            }
            let mut next = entry.clone();
            next.status = WaitlistStatus::Expired;
            next.updated_at = now;
            if self.waitlist.compare_and_set(&next, WaitlistStatus::Active).await?.is_some() {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(%salon_id, expired, "Expired stale waitlist entries");
        }
        Ok(expired)
    }

    /// Recompute every active score at the salon. Returns how many changed.
    pub async fn rescore_active(&self, salon_id: Uuid) -> Result<usize, MatchError> {
        let entries = self.waitlist.list_active_for_salon(salon_id).await?;
        self.rescore(entries).await
    }

    /// Recompute after the customer's attendance history changed.
    pub async fn rescore_customer(&self, customer_id: Uuid) -> Result<usize, MatchError> {
        let entries = self
            .waitlist
            .list_for_customer(customer_id)
            .await?
            .into_iter()
            .filter(|e| e.status == WaitlistStatus::Active)
            .collect();
        self.rescore(entries).await
    }

    async fn rescore(&self, entries: Vec<WaitlistEntry>) -> Result<usize, MatchError> {
        let now = self.clock.now();
        let mut changed = 0;
        for entry in entries {
            let before = entry.priority_score;
            if let Some(stored) = self.refresh_score(entry, now).await? {
                if stored.priority_score != before {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// Recompute and store an active entry's score. `None` if another writer
    /// moved the entry first.
    async fn refresh_score(
        &self,
        entry: WaitlistEntry,
        now: DateTime<Utc>,
    ) -> Result<Option<WaitlistEntry>, MatchError> {
        let score = self.score(&entry).await?;
        if score == entry.priority_score {
            return Ok(Some(entry));
        }
        let mut next = entry;
        next.priority_score = score;
        next.updated_at = now;
        Ok(self.waitlist.compare_and_set(&next, WaitlistStatus::Active).await?)
    }

    async fn offer_next(&self, slot: &SlotDescriptor) -> Result<MatchOutcome, MatchError> {
        let key = slot.key();
        let now = self.clock.now();
        let tried = {
            let mut rounds = self.rounds.lock().await;
            rounds.entry(key).or_default().clone()
        };

        let mut candidates = Vec::new();
        if slot.starts_at > now {
            let fitting = self
                .waitlist
                .list_active(slot.salon_id, slot.service_id)
                .await?
                .into_iter()
                .filter(|e| e.accepts(slot) && !e.is_stale(now) && !tried.contains(&e.id));
            // Time waited counts, so scores are brought up to date before ranking
            for entry in fitting {
                if let Some(fresh) = self.refresh_score(entry, now).await? {
                    candidates.push(fresh);
                }
            }
            rank(&mut candidates);
        } else {
            tracing::info!(salon_id = %slot.salon_id, starts_at = %slot.starts_at, "Slot has started, no more offers");
        }

        // Never ask for an answer after the appointment has begun
        let deadline = (now + self.response_window).min(slot.starts_at);
        for candidate in candidates {
            let mut offered = candidate.clone();
            offered.status = WaitlistStatus::Matched;
            offered.offered_slot = Some(slot.clone());
            offered.match_deadline = Some(deadline);
            offered.updated_at = now;

            let stored = self
                .waitlist
                .compare_and_set(&offered, WaitlistStatus::Active)
                .await?;
            self.mark_tried(key, candidate.id).await;
            let Some(stored) = stored else {
                tracing::warn!(entry_id = %candidate.id, "Candidate changed under us, trying next");
                continue;
            };

            tracing::info!(
                entry_id = %stored.id,
                score = stored.priority_score,
                %deadline,
                "Slot offered to waitlist entry"
            );
            self.scheduler.schedule(
                deadline,
                TimerTask::OfferResponseDeadline {
                    entry_id: stored.id,
                    deadline,
                },
            );
            self.send_offer_message(&stored, slot, templates::WAITLIST_OFFER, Some(deadline))
                .await;
            return Ok(MatchOutcome::Offered(stored));
        }

        // Nobody left: give the slot back
        let candidates_tried = self
            .rounds
            .lock()
            .await
            .remove(&key)
            .map(|tried| tried.len())
            .unwrap_or(0);
        self.slots.release(key, SlotHolder::Waitlist).await?;
        if candidates_tried == 0 {
            tracing::debug!(salon_id = %slot.salon_id, starts_at = %slot.starts_at, "No waitlist candidates");
            Ok(MatchOutcome::NoCandidates)
        } else {
            tracing::warn!(
                salon_id = %slot.salon_id,
                starts_at = %slot.starts_at,
                candidates_tried,
                "Waitlist exhausted, slot left unfilled"
            );
            Ok(MatchOutcome::Unfilled {
                slot: slot.clone(),
                candidates_tried,
            })
        }
    }

    async fn mark_tried(&self, key: SlotKey, entry_id: Uuid) {
        if let Some(tried) = self.rounds.lock().await.get_mut(&key) {
            tried.insert(entry_id);
        }
    }

    async fn send_offer_message(
        &self,
        entry: &WaitlistEntry,
        slot: &SlotDescriptor,
        template: &str,
        deadline: Option<DateTime<Utc>>,
    ) {
        let mut vars = BTreeMap::new();
        vars.insert("starts_at".to_string(), display_time(slot.starts_at));
        if let Some(deadline) = deadline {
            vars.insert("deadline".to_string(), display_time(deadline));
        }
        let body = match self.renderer.render(template, &vars).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(entry_id = %entry.id, error = %e, "Waitlist message not rendered");
                return;
            }
        };
        let (owner, priority) = if template == templates::WAITLIST_OFFER {
            (NotificationOwner::WaitlistOffer { entry_id: entry.id }, NotificationPriority::Normal)
        } else {
            (NotificationOwner::Courtesy { reference_id: entry.id }, NotificationPriority::Low)
        };
        let mut message = NotificationRequest::new(entry.salon_id, owner, entry.contact.clone(), body, priority);
        message.reply_by = deadline;
        match self.dispatcher.send(&message).await {
            Ok(_) | Err(SendError::RetryScheduled { .. }) => {}
            Err(e) => tracing::warn!(entry_id = %entry.id, error = %e, "Waitlist message not delivered"),
        }
    }

    async fn load(&self, entry_id: Uuid) -> Result<WaitlistEntry, MatchError> {
        self.waitlist
            .get(entry_id)
            .await?
            .ok_or(MatchError::EntryNotFound(entry_id))
    }

    async fn history(&self, salon_id: Uuid, customer_id: Uuid) -> Result<ReliabilityHistory, MatchError> {
        let bookings = self.bookings.list_for_customer(customer_id).await?;
        Ok(ReliabilityHistory::from_bookings(
            bookings.iter().filter(|b| b.salon_id == salon_id),
        ))
    }
}

fn display_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backfill_domain::{BookingStatus, ContactPoint, PreferredWindow};
    use backfill_notify::DeliveryPolicy;
    use backfill_store::testing::{ManualClock, RecordingScheduler, ScriptedProvider};
    use backfill_store::{
        InMemoryBookingRepository, InMemoryConfirmationRepository, InMemoryNotificationAttemptRepository,
        InMemorySlotRepository, InMemoryWaitlistRepository, PlainTemplateRenderer,
    };
    use chrono::TimeZone;

    struct Harness {
        matcher: WaitlistMatcher,
        waitlist: Arc<InMemoryWaitlistRepository>,
        slots: Arc<InMemorySlotRepository>,
        scheduler: Arc<RecordingScheduler>,
        clock: Arc<ManualClock>,
        provider: Arc<ScriptedProvider>,
        salon_id: Uuid,
        service_id: Uuid,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let waitlist = Arc::new(InMemoryWaitlistRepository::new());
        let slots = Arc::new(InMemorySlotRepository::new());
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let clock = Arc::new(ManualClock::new(now()));
        let provider = Arc::new(ScriptedProvider::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            provider.clone(),
            Arc::new(InMemoryNotificationAttemptRepository::new()),
            Arc::new(InMemoryConfirmationRepository::new()),
            waitlist.clone(),
            scheduler.clone(),
            clock.clone(),
            DeliveryPolicy::default(),
        ));
        let matcher = WaitlistMatcher::new(
            waitlist.clone(),
            bookings,
            slots.clone(),
            dispatcher,
            Arc::new(PlainTemplateRenderer::new()),
            scheduler.clone(),
            clock.clone(),
            PriorityScorer::default(),
            Duration::hours(2),
        );
        Harness {
            matcher,
            waitlist,
            slots,
            scheduler,
            clock,
            provider,
            salon_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
        }
    }

    fn slot(h: &Harness) -> SlotDescriptor {
        SlotDescriptor {
            salon_id: h.salon_id,
            service_id: h.service_id,
            resource_id: Uuid::new_v4(),
            starts_at: now() + Duration::hours(6),
            duration_minutes: 60,
            price_cents: 4000,
        }
    }

    async fn waiting(h: &Harness, score: f64, created_at: DateTime<Utc>) -> WaitlistEntry {
        let entry = WaitlistEntry::new(
            NewWaitlistEntry {
                salon_id: h.salon_id,
                service_id: h.service_id,
                customer_id: Uuid::new_v4(),
                contact: ContactPoint::sms("+15550004321"),
                window: PreferredWindow {
                    from: now(),
                    to: now() + Duration::days(2),
                },
            },
            score,
            created_at,
        );
        h.waitlist.insert(&entry).await.unwrap();
        entry
    }

    #[tokio::test]
    async fn test_tie_goes_to_earliest_entry() {
        let h = harness();
        // Both past the wait saturation point, so both score 80
        let _a = waiting(&h, 85.0, now() - Duration::days(4)).await;
        let b = waiting(&h, 85.0, now() - Duration::days(5)).await;

        let outcome = h.matcher.on_slot_freed(&slot(&h)).await.unwrap();

        let offered = outcome.offered().unwrap();
        assert_eq!(offered.id, b.id);
        assert_eq!(offered.status, WaitlistStatus::Matched);
        assert_eq!(offered.match_deadline, Some(now() + Duration::hours(2)));
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_slot_freed_assigns_one_entry() {
        let h = Arc::new(harness());
        for i in 0..3 {
            waiting(&h, 60.0 + f64::from(i), now() - Duration::hours(1)).await;
        }
        let freed = slot(&h);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                let freed = freed.clone();
                tokio::spawn(async move { h.matcher.on_slot_freed(&freed).await })
            })
            .collect();
        let outcomes: Vec<MatchOutcome> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(outcomes.iter().filter(|o| o.offered().is_some()).count(), 1);
        assert_eq!(
            outcomes.iter().filter(|o| **o == MatchOutcome::AlreadyResolved).count(),
            7
        );
        let active = h.waitlist.list_active(h.salon_id, h.service_id).await.unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_pool_leaves_slot_open() {
        let h = harness();
        let freed = slot(&h);

        let outcome = h.matcher.on_slot_freed(&freed).await.unwrap();

        assert_eq!(outcome, MatchOutcome::NoCandidates);
        assert_eq!(h.slots.holder(freed.key()).await.unwrap(), None);
        assert_eq!(h.provider.calls(), 0);
        assert!(h.scheduler.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_and_decline_cascade_until_unfilled() {
        let h = harness();
        let first = waiting(&h, 90.0, now() - Duration::hours(4)).await;
        let second = waiting(&h, 70.0, now() - Duration::hours(3)).await;
        let freed = slot(&h);

        let outcome = h.matcher.on_slot_freed(&freed).await.unwrap();
        assert_eq!(outcome.offered().unwrap().id, first.id);

        // First candidate never answers
        let deadline = now() + Duration::hours(2);
        h.clock.set(deadline);
        let outcome = h.matcher.on_offer_timeout(first.id, deadline).await.unwrap().unwrap();
        assert_eq!(outcome.offered().unwrap().id, second.id);

        let lapsed = h.matcher.get(first.id).await.unwrap().unwrap();
        assert_eq!(lapsed.status, WaitlistStatus::Active);
        assert_eq!(lapsed.offered_slot, None);
        // Recomputed: 6h of 72h waited, base reliability, full 48h window
        assert_eq!(lapsed.priority_score, 43.3);

        // Second declines; nobody is left
        let outcome = h.matcher.decline_offer(second.id).await.unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::Unfilled {
                slot: freed.clone(),
                candidates_tried: 2
            }
        );
        assert_eq!(h.slots.holder(freed.key()).await.unwrap(), None);

        // A second firing of the same timer is ignored
        assert!(h.matcher.on_offer_timeout(first.id, deadline).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_accept_creates_waitlist_booking_and_transfers_slot() {
        let h = harness();
        let entry = waiting(&h, 75.0, now() - Duration::hours(1)).await;
        let freed = slot(&h);
        h.matcher.on_slot_freed(&freed).await.unwrap();

        h.clock.advance(Duration::minutes(30));
        let booking = h.matcher.accept_offer(entry.id).await.unwrap();

        assert_eq!(booking.source, BookingSource::Waitlist { entry_id: entry.id });
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.price_cents, 4000);
        assert_eq!(
            h.slots.holder(freed.key()).await.unwrap(),
            Some(SlotHolder::Booking(booking.id))
        );
        // Accepting twice returns the same booking
        assert_eq!(h.matcher.accept_offer(entry.id).await.unwrap().id, booking.id);
        // And the offer timer no longer has anything to do
        let deadline = now() + Duration::hours(2);
        h.clock.set(deadline);
        assert!(h.matcher.on_offer_timeout(entry.id, deadline).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_late_accept_is_rejected() {
        let h = harness();
        let entry = waiting(&h, 75.0, now() - Duration::hours(1)).await;
        h.matcher.on_slot_freed(&slot(&h)).await.unwrap();

        h.clock.advance(Duration::hours(2));
        assert!(matches!(
            h.matcher.accept_offer(entry.id).await,
            Err(MatchError::OfferExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_dequeue_with_open_offer_moves_slot_on() {
        let h = harness();
        let first = waiting(&h, 90.0, now() - Duration::hours(2)).await;
        let second = waiting(&h, 50.0, now() - Duration::hours(1)).await;
        h.matcher.on_slot_freed(&slot(&h)).await.unwrap();

        let cascade = h.matcher.dequeue(first.id).await.unwrap().unwrap();

        assert_eq!(cascade.offered().unwrap().id, second.id);
        assert!(h.matcher.get(first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_validates_and_scores() {
        let h = harness();
        let window = PreferredWindow {
            from: now() + Duration::hours(1),
            to: now() + Duration::hours(25),
        };
        let new = NewWaitlistEntry {
            salon_id: h.salon_id,
            service_id: h.service_id,
            customer_id: Uuid::new_v4(),
            contact: ContactPoint::email("dee@example.com"),
            window,
        };

        let entry = h.matcher.enqueue(new.clone()).await.unwrap();
        // 0 waited + 20 base + 24h of a 48h window
        assert_eq!(entry.priority_score, 30.0);

        let mut backwards = new;
        backwards.window = PreferredWindow {
            from: window.to,
            to: window.from,
        };
        assert!(matches!(h.matcher.enqueue(backwards).await, Err(MatchError::Domain(_))));
    }

    #[tokio::test]
    async fn test_stale_entries_expire() {
        let h = harness();
        let entry = waiting(&h, 40.0, now() - Duration::hours(1)).await;

        h.clock.advance(Duration::days(3));
        assert_eq!(h.matcher.expire_stale_entries(h.salon_id).await.unwrap(), 1);
        assert_eq!(
            h.matcher.get(entry.id).await.unwrap().unwrap().status,
            WaitlistStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_time_waited_counts_at_match_time() {
        let h = harness();
        // Stored scores from enqueue time, before any waiting counted
        let veteran = waiting(&h, 10.0, now() - Duration::days(3)).await;
        let newcomer = waiting(&h, 50.0, now()).await;

        let outcome = h.matcher.on_slot_freed(&slot(&h)).await.unwrap();

        let offered = outcome.offered().unwrap();
        assert_eq!(offered.id, veteran.id);
        assert_eq!(offered.priority_score, 80.0);
        assert_eq!(h.matcher.get(newcomer.id).await.unwrap().unwrap().priority_score, 40.0);
    }

    #[tokio::test]
    async fn test_cascade_stops_once_slot_has_started() {
        let h = harness();
        let first = waiting(&h, 90.0, now() - Duration::hours(4)).await;
        let second = waiting(&h, 70.0, now() - Duration::hours(3)).await;
        let soon = SlotDescriptor {
            starts_at: now() + Duration::hours(1),
            ..slot(&h)
        };

        let outcome = h.matcher.on_slot_freed(&soon).await.unwrap();
        let offered = outcome.offered().unwrap();
        assert_eq!(offered.id, first.id);
        // Capped at the start instead of the full two hours
        assert_eq!(offered.match_deadline, Some(soon.starts_at));

        h.clock.set(soon.starts_at);
        let outcome = h
            .matcher
            .on_offer_timeout(first.id, soon.starts_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::Unfilled {
                slot: soon.clone(),
                candidates_tried: 1
            }
        );
        assert_eq!(h.slots.holder(soon.key()).await.unwrap(), None);
        let untouched = h.matcher.get(second.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, WaitlistStatus::Active);
        assert!(untouched.offered_slot.is_none());
    }

    #[tokio::test]
    async fn test_failed_handover_unpins_acceptance() {
        let h = harness();
        let entry = waiting(&h, 75.0, now() - Duration::hours(1)).await;
        let freed = slot(&h);
        h.matcher.on_slot_freed(&freed).await.unwrap();
        // Slot disappears from under the open offer
        assert!(h.slots.release(freed.key(), SlotHolder::Waitlist).await.unwrap());

        let err = h.matcher.accept_offer(entry.id).await.unwrap_err();
        assert!(matches!(err, MatchError::Conflict(_)));

        let stored = h.matcher.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_booking_id, None);
        assert!(stored.has_open_offer());
        // Still answerable, and still refused for the same reason
        let err = h.matcher.accept_offer(entry.id).await.unwrap_err();
        assert!(matches!(err, MatchError::Conflict(msg) if msg.contains("no longer held")));
    }
}
