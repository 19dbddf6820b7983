use backfill_domain::analytics::{format_cents, percentage, roi_percent};
use backfill_domain::AnalyticsPeriod;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Totals across a run of daily periods. Rates are derived from the summed
/// counts, never averaged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub salon_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub periods: usize,

    pub total_bookings: u64,
    pub no_shows: u64,
    pub cancellations: u64,
    pub completions: u64,
    pub confirmations_sent: u64,
    pub confirmations_received: u64,
    pub freed_slots: u64,
    pub waitlist_matches: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,

    pub no_show_rate: f64,
    pub confirmation_rate: f64,
    pub waitlist_fill_rate: f64,

    pub revenue_lost_cents: i64,
    pub revenue_saved_cents: i64,
    pub revenue_total_cents: i64,
    pub notification_cost_cents: i64,
    pub system_roi: f64,
}

impl DashboardSummary {
    pub fn empty(salon_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::from_periods(salon_id, from, to, &[])
    }

    pub fn from_periods(salon_id: Uuid, from: DateTime<Utc>, to: DateTime<Utc>, periods: &[AnalyticsPeriod]) -> Self {
        let mut s = Self {
            salon_id,
            from,
            to,
            periods: periods.len(),
            total_bookings: 0,
            no_shows: 0,
            cancellations: 0,
            completions: 0,
            confirmations_sent: 0,
            confirmations_received: 0,
            freed_slots: 0,
            waitlist_matches: 0,
            notifications_sent: 0,
            notifications_failed: 0,
            no_show_rate: 0.0,
            confirmation_rate: 0.0,
            waitlist_fill_rate: 0.0,
            revenue_lost_cents: 0,
            revenue_saved_cents: 0,
            revenue_total_cents: 0,
            notification_cost_cents: 0,
            system_roi: 0.0,
        };

        for p in periods {
            s.total_bookings += p.total_bookings;
            s.no_shows += p.no_shows;
            s.cancellations += p.cancellations;
            s.completions += p.completions;
            s.confirmations_sent += p.confirmations_sent;
            s.confirmations_received += p.confirmations_received;
            s.freed_slots += p.freed_slots;
            s.waitlist_matches += p.waitlist_matches;
            s.notifications_sent += p.notifications_sent;
            s.notifications_failed += p.notifications_failed;
            s.revenue_lost_cents += p.revenue_lost_cents;
            s.revenue_saved_cents += p.revenue_saved_cents;
            s.revenue_total_cents += p.revenue_total_cents;
            s.notification_cost_cents += p.notification_cost_cents;
        }

        s.no_show_rate = percentage(s.no_shows, s.total_bookings);
        s.confirmation_rate = percentage(s.confirmations_received, s.confirmations_sent);
        s.waitlist_fill_rate = fill_rate(s.waitlist_matches, s.freed_slots);
        s.system_roi = roi_percent(s.revenue_saved_cents, s.notification_cost_cents);
        s
    }

    pub fn revenue_lost_display(&self) -> String {
        format_cents(self.revenue_lost_cents)
    }

    pub fn revenue_saved_display(&self) -> String {
        format_cents(self.revenue_saved_cents)
    }
}

/// Share of freed slots refilled from the waitlist, capped at 100.
pub fn fill_rate(matches: u64, freed_slots: u64) -> f64 {
    percentage(matches, freed_slots).min(100.0)
}
