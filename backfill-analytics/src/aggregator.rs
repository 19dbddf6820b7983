use crate::reliability::reliability_lists;
use crate::summary::{fill_rate, DashboardSummary};
use crate::AnalyticsError;
use backfill_core::repository::{
    AnalyticsRepository, BookingRepository, ConfirmationRepository, NotificationAttemptRepository,
};
use backfill_core::Clock;
use backfill_domain::analytics::percentage;
use backfill_domain::{
    AnalyticsPeriod, AttemptResult, BookingStatus, Channel, ConfirmationState, PeriodKind,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Namespace for period ids; same salon, kind and window always map to the same id.
const PERIOD_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_93a4_4d05_8e61_5b0f_c2d9_a417);

/// Per-message price by channel, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationCosts {
    pub sms_cents: i64,
    pub email_cents: i64,
}

impl NotificationCosts {
    pub fn for_channel(&self, channel: Channel) -> i64 {
        match channel {
            Channel::Sms => self.sms_cents,
            Channel::Email => self.email_cents,
        }
    }
}

impl Default for NotificationCosts {
    fn default() -> Self {
        Self {
            sms_cents: 5,
            email_cents: 1,
        }
    }
}

pub struct AnalyticsAggregator {
    bookings: Arc<dyn BookingRepository>,
    confirmations: Arc<dyn ConfirmationRepository>,
    attempts: Arc<dyn NotificationAttemptRepository>,
    periods: Arc<dyn AnalyticsRepository>,
    clock: Arc<dyn Clock>,
    costs: NotificationCosts,
    list_size: usize,
}

impl AnalyticsAggregator {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        confirmations: Arc<dyn ConfirmationRepository>,
        attempts: Arc<dyn NotificationAttemptRepository>,
        periods: Arc<dyn AnalyticsRepository>,
        clock: Arc<dyn Clock>,
        costs: NotificationCosts,
        list_size: usize,
    ) -> Self {
        Self {
            bookings,
            confirmations,
            attempts,
            periods,
            clock,
            costs,
            list_size,
        }
    }

    pub fn period_id(salon_id: Uuid, kind: PeriodKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Uuid {
        let name = format!(
            "{}:{}:{}:{}",
            salon_id,
            kind,
            start.timestamp_millis(),
            end.timestamp_millis()
        );
        Uuid::new_v5(&PERIOD_NAMESPACE, name.as_bytes())
    }

    /// Build the snapshot for `[start, end)` from scratch and store it,
    /// replacing any earlier snapshot of the same window.
    pub async fn generate_for_period(
        &self,
        salon_id: Uuid,
        kind: PeriodKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, AnalyticsError> {
        if end <= start {
            return Err(AnalyticsError::Validation(format!(
                "period must end after it starts ({} .. {})",
                start, end
            )));
        }

        // 1. Bookings whose appointment falls in the window
        let bookings = self.bookings.list_in_range(salon_id, start, end).await?;
        let count = |status: BookingStatus| bookings.iter().filter(|b| b.status == status).count() as u64;
        let no_shows = count(BookingStatus::NoShow);
        let cancellations = count(BookingStatus::Cancelled);
        let completions = count(BookingStatus::Completed);
        let waitlist_matches = bookings.iter().filter(|b| b.is_waitlist_fill()).count() as u64;

        let kept = |status: BookingStatus| !matches!(status, BookingStatus::Cancelled | BookingStatus::NoShow);
        let revenue_lost_cents: i64 = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::NoShow)
            .map(|b| b.price_cents)
            .sum();
        let revenue_saved_cents: i64 = bookings
            .iter()
            .filter(|b| b.is_waitlist_fill() && kept(b.status))
            .map(|b| b.price_cents)
            .sum();
        let revenue_total_cents: i64 = bookings
            .iter()
            .filter(|b| kept(b.status))
            .map(|b| b.price_cents)
            .sum();

        // 2. Confirmation outreach for those bookings
        let ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();
        let requests = self.confirmations.list_for_bookings(&ids).await?;
        let sent: Vec<_> = requests.iter().filter(|r| r.sent_at.is_some()).collect();
        let confirmations_sent = sent.len() as u64;
        let confirmations_received = sent
            .iter()
            .filter(|r| r.state == ConfirmationState::Confirmed)
            .count() as u64;

        // 3. Notification attempts made during the window
        let attempts = self.attempts.list_in_range(salon_id, start, end).await?;
        let delivered: Vec<_> = attempts.iter().filter(|a| a.result.is_success()).collect();
        let notifications_sent = delivered.len() as u64;
        let notifications_failed = attempts
            .iter()
            .filter(|a| matches!(a.result, AttemptResult::Failed | AttemptResult::Bounced))
            .count() as u64;
        let notification_cost_cents: i64 = delivered.iter().map(|a| self.costs.for_channel(a.channel)).sum();

        let (top_reliable_customers, least_reliable_customers) = reliability_lists(&bookings, self.list_size);

        let period = AnalyticsPeriod {
            id: Self::period_id(salon_id, kind, start, end),
            salon_id,
            kind,
            start,
            end,
            total_bookings: bookings.len() as u64,
            no_shows,
            cancellations,
            completions,
            confirmations_sent,
            confirmations_received,
            freed_slots: cancellations,
            waitlist_matches,
            notifications_sent,
            notifications_failed,
            no_show_rate: percentage(no_shows, bookings.len() as u64),
            confirmation_rate: percentage(confirmations_received, confirmations_sent),
            waitlist_fill_rate: fill_rate(waitlist_matches, cancellations),
            revenue_lost_cents,
            revenue_saved_cents,
            revenue_total_cents,
            notification_cost_cents,
            top_reliable_customers,
            least_reliable_customers,
        };
        self.periods.upsert(&period).await?;

        tracing::info!(
            %salon_id,
            %kind,
            %start,
            bookings = period.total_bookings,
            no_show_rate = period.no_show_rate,
            "Analytics period generated"
        );
        Ok(period)
    }

    /// Generate the period of `kind` that contains `instant`.
    pub async fn generate_containing(
        &self,
        salon_id: Uuid,
        kind: PeriodKind,
        instant: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, AnalyticsError> {
        let (start, end) = kind
            .bounds_containing(instant)
            .ok_or_else(|| AnalyticsError::Validation(format!("no {} period contains {}", kind, instant)))?;
        self.generate_for_period(salon_id, kind, start, end).await
    }

    /// Sum of the stored daily periods for the last `window_days` complete days.
    pub async fn dashboard_summary(&self, salon_id: Uuid, window_days: i64) -> Result<DashboardSummary, AnalyticsError> {
        if window_days <= 0 {
            return Err(AnalyticsError::Validation(format!(
                "summary window must be positive, got {} days",
                window_days
            )));
        }
        let now = self.clock.now();
        let (today, _) = PeriodKind::Daily
            .bounds_containing(now)
            .ok_or_else(|| AnalyticsError::Validation(format!("cannot place {} in a day", now)))?;
        let from = today - Duration::days(window_days);

        let periods = self
            .periods
            .list_in_range(salon_id, PeriodKind::Daily, from, today)
            .await?;
        Ok(DashboardSummary::from_periods(salon_id, from, today, &periods))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backfill_domain::analytics::format_cents;
    use backfill_domain::{
        Booking, BookingSource, ConfirmationRequest, ContactPoint, NewBooking, NotificationAttempt,
        NotificationOwner,
    };
    use backfill_store::testing::ManualClock;
    use backfill_store::{
        InMemoryAnalyticsRepository, InMemoryBookingRepository, InMemoryConfirmationRepository,
        InMemoryNotificationAttemptRepository,
    };
    use chrono::TimeZone;

    struct Harness {
        aggregator: AnalyticsAggregator,
        bookings: Arc<InMemoryBookingRepository>,
        confirmations: Arc<InMemoryConfirmationRepository>,
        attempts: Arc<InMemoryNotificationAttemptRepository>,
        salon_id: Uuid,
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let bookings = Arc::new(InMemoryBookingRepository::new());
        let confirmations = Arc::new(InMemoryConfirmationRepository::new());
        let attempts = Arc::new(InMemoryNotificationAttemptRepository::new());
        let aggregator = AnalyticsAggregator::new(
            bookings.clone(),
            confirmations.clone(),
            attempts.clone(),
            Arc::new(InMemoryAnalyticsRepository::new()),
            Arc::new(ManualClock::new(now)),
            NotificationCosts::default(),
            5,
        );
        Harness {
            aggregator,
            bookings,
            confirmations,
            attempts,
            salon_id: Uuid::new_v4(),
        }
    }

    async fn add(
        h: &Harness,
        starts_at: DateTime<Utc>,
        status: BookingStatus,
        price_cents: i64,
        source: BookingSource,
    ) -> Booking {
        let mut booking = Booking::new(
            NewBooking {
                salon_id: h.salon_id,
                customer_id: Uuid::new_v4(),
                service_id: Uuid::new_v4(),
                resource_id: Uuid::new_v4(),
                contact: ContactPoint::sms("+15550002222"),
                starts_at,
                duration_minutes: 30,
                price_cents,
            },
            source,
            starts_at - Duration::days(7),
        );
        booking.status = status;
        h.bookings.insert(&booking).await.unwrap();
        booking
    }

    async fn ten_bookings(h: &Harness, d: u32) {
        let base = day(d) + Duration::hours(9);
        for i in 0..7 {
            add(h, base + Duration::minutes(30 * i), BookingStatus::Completed, 3000, BookingSource::Direct).await;
        }
        add(h, base + Duration::hours(5), BookingStatus::NoShow, 5000, BookingSource::Direct).await;
        add(h, base + Duration::hours(6), BookingStatus::NoShow, 5000, BookingSource::Direct).await;
        add(
            h,
            base + Duration::hours(7),
            BookingStatus::Completed,
            4000,
            BookingSource::Waitlist {
                entry_id: Uuid::new_v4(),
            },
        )
        .await;
    }

    #[tokio::test]
    async fn test_no_show_rate_and_revenue() {
        let h = harness(day(20));
        ten_bookings(&h, 10).await;

        let period = h
            .aggregator
            .generate_for_period(h.salon_id, PeriodKind::Daily, day(10), day(11))
            .await
            .unwrap();

        assert_eq!(period.total_bookings, 10);
        assert_eq!(period.no_shows, 2);
        assert_eq!(period.no_show_rate, 20.0);
        assert_eq!(period.revenue_lost_cents, 10000);
        assert_eq!(format_cents(period.revenue_lost_cents), "100.00");
        assert_eq!(period.revenue_saved_cents, 4000);
        assert_eq!(format_cents(period.revenue_saved_cents), "40.00");
        assert_eq!(period.revenue_total_cents, 7 * 3000 + 4000);
        assert_eq!(period.waitlist_matches, 1);
        // Nothing was freed in this window, so nothing to fill
        assert_eq!(period.waitlist_fill_rate, 0.0);
    }

    #[tokio::test]
    async fn test_regeneration_is_bit_identical() {
        let h = harness(day(20));
        ten_bookings(&h, 10).await;

        let first = h
            .aggregator
            .generate_for_period(h.salon_id, PeriodKind::Daily, day(10), day(11))
            .await
            .unwrap();
        let second = h
            .aggregator
            .generate_for_period(h.salon_id, PeriodKind::Daily, day(10), day(11))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_confirmation_rate_and_notification_cost() {
        let h = harness(day(20));
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(add(&h, day(10) + Duration::hours(10), BookingStatus::Pending, 2000, BookingSource::Direct).await);
        }
        for (i, booking) in ids.iter().enumerate() {
            let mut request = ConfirmationRequest::new(booking.id, h.salon_id, Channel::Sms, day(9));
            request.sent_at = Some(day(9) + Duration::hours(10));
            if i < 3 {
                request.state = ConfirmationState::Confirmed;
            } else {
                request.state = ConfirmationState::AutoCancelled;
            }
            h.confirmations.insert(&request).await.unwrap();
        }
        for (result, channel) in [
            (AttemptResult::Sent, Channel::Sms),
            (AttemptResult::Delivered, Channel::Email),
            (AttemptResult::Failed, Channel::Sms),
        ] {
            h.attempts
                .append(&NotificationAttempt {
                    id: Uuid::new_v4(),
                    salon_id: h.salon_id,
                    owner: NotificationOwner::Confirmation { booking_id: ids[0].id },
                    target: "+15550002222".into(),
                    channel,
                    payload_ref: Uuid::new_v4(),
                    attempt: 1,
                    result,
                    error_detail: None,
                    scheduled_for: day(10) + Duration::hours(1),
                    created_at: day(10) + Duration::hours(1),
                })
                .await
                .unwrap();
        }

        let period = h
            .aggregator
            .generate_for_period(h.salon_id, PeriodKind::Daily, day(10), day(11))
            .await
            .unwrap();

        assert_eq!(period.confirmations_sent, 4);
        assert_eq!(period.confirmations_received, 3);
        assert_eq!(period.confirmation_rate, 75.0);
        assert_eq!(period.notifications_sent, 2);
        assert_eq!(period.notifications_failed, 1);
        assert_eq!(period.notification_cost_cents, 6);
    }

    #[tokio::test]
    async fn test_fill_rate_is_capped() {
        let h = harness(day(20));
        let at = day(10) + Duration::hours(9);
        add(&h, at, BookingStatus::Cancelled, 4000, BookingSource::Direct).await;
        for _ in 0..2 {
            add(
                &h,
                at,
                BookingStatus::Confirmed,
                4000,
                BookingSource::Waitlist {
                    entry_id: Uuid::new_v4(),
                },
            )
            .await;
        }

        let period = h
            .aggregator
            .generate_for_period(h.salon_id, PeriodKind::Daily, day(10), day(11))
            .await
            .unwrap();
        assert_eq!(period.freed_slots, 1);
        assert_eq!(period.waitlist_fill_rate, 100.0);
    }

    #[tokio::test]
    async fn test_summary_sums_before_dividing() {
        let h = harness(day(12) + Duration::hours(8));
        // Day 10: 2 of 10 no-shows
        ten_bookings(&h, 10).await;
        // Day 11: 1 of 2 no-shows
        let at = day(11) + Duration::hours(9);
        add(&h, at, BookingStatus::NoShow, 5000, BookingSource::Direct).await;
        add(&h, at + Duration::hours(1), BookingStatus::Completed, 5000, BookingSource::Direct).await;
        for d in [10, 11] {
            h.aggregator
                .generate_for_period(h.salon_id, PeriodKind::Daily, day(d), day(d + 1))
                .await
                .unwrap();
        }

        let summary = h.aggregator.dashboard_summary(h.salon_id, 7).await.unwrap();

        assert_eq!(summary.periods, 2);
        assert_eq!(summary.total_bookings, 12);
        assert_eq!(summary.no_shows, 3);
        // 3 / 12, not the mean of 20% and 50%
        assert_eq!(summary.no_show_rate, 25.0);
        assert_eq!(summary.revenue_lost_display(), "150.00");
    }

    #[tokio::test]
    async fn test_empty_window_gives_zero_summary() {
        let h = harness(day(12));
        let summary = h.aggregator.dashboard_summary(h.salon_id, 30).await.unwrap();
        assert_eq!(summary, DashboardSummary::empty(h.salon_id, day(12) - Duration::days(30), day(12)));
        assert_eq!(summary.no_show_rate, 0.0);
        assert_eq!(summary.system_roi, 0.0);
    }

    #[test]
    fn test_period_id_is_deterministic() {
        let salon = Uuid::new_v4();
        let a = AnalyticsAggregator::period_id(salon, PeriodKind::Weekly, day(6), day(13));
        let b = AnalyticsAggregator::period_id(salon, PeriodKind::Weekly, day(6), day(13));
        let c = AnalyticsAggregator::period_id(salon, PeriodKind::Daily, day(6), day(7));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
