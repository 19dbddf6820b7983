use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeriodKind::Daily => "daily",
            PeriodKind::Weekly => "weekly",
            PeriodKind::Monthly => "monthly",
            PeriodKind::Yearly => "yearly",
        };
        write!(f, "{}", s)
    }
}

impl PeriodKind {
    /// Half-open `[start, end)` UTC window of this kind that contains `instant`.
    /// Weeks start on Monday.
    pub fn bounds_containing(&self, instant: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let date = instant.date_naive();
        let (start, end) = match self {
            PeriodKind::Daily => (date, date.succ_opt()?),
            PeriodKind::Weekly => {
                let offset = i64::from(date.weekday().num_days_from_monday());
                let monday = date - Duration::days(offset);
                (monday, monday + Duration::days(7))
            }
            PeriodKind::Monthly => {
                let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
                let next = if date.month() == 12 {
                    NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
                };
                (first, next)
            }
            PeriodKind::Yearly => (
                NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
                NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?,
            ),
        };
        Some((start.and_hms_opt(0, 0, 0)?.and_utc(), end.and_hms_opt(0, 0, 0)?.and_utc()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerReliabilityRow {
    pub customer_id: Uuid,
    pub completions: u32,
    pub no_shows: u32,
    pub reliability_percent: f64,
}

/// Immutable aggregate for one salon and one window. Regenerating replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsPeriod {
    pub id: Uuid,
    pub salon_id: Uuid,
    pub kind: PeriodKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

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

    pub top_reliable_customers: Vec<CustomerReliabilityRow>,
    pub least_reliable_customers: Vec<CustomerReliabilityRow>,
}

impl AnalyticsPeriod {
    /// Return on the notification spend, derived from the stored money figures.
    pub fn system_roi(&self) -> f64 {
        roi_percent(self.revenue_saved_cents, self.notification_cost_cents)
    }
}

/// Round to one decimal place, the fixed precision of every stored percentage.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `numerator / denominator * 100`, rounded; 0 for an empty denominator.
pub fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round1(numerator as f64 / denominator as f64 * 100.0)
}

/// `(saved - cost) / cost * 100`, rounded; 0 when nothing was spent.
pub fn roi_percent(saved_cents: i64, cost_cents: i64) -> f64 {
    if cost_cents == 0 {
        return 0.0;
    }
    round1((saved_cents - cost_cents) as f64 / cost_cents as f64 * 100.0)
}

/// Minor units to a two-decimal display string, `10000 -> "100.00"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rates_and_roi() {
        assert_eq!(percentage(2, 10), 20.0);
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(5, 0), 0.0);

        assert_eq!(roi_percent(4000, 0), 0.0);
        assert_eq!(roi_percent(4000, 1000), 300.0);
        assert_eq!(format_cents(10000), "100.00");
        assert_eq!(format_cents(-4005), "-40.05");
    }

    #[test]
    fn test_period_bounds() {
        // Wednesday
        let instant = Utc.with_ymd_and_hms(2025, 1, 15, 13, 30, 0).unwrap();

        let (start, end) = PeriodKind::Daily.bounds_containing(instant).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 16, 0, 0, 0).unwrap());

        let (start, end) = PeriodKind::Weekly.bounds_containing(instant).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 13, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap());

        let december = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        let (start, end) = PeriodKind::Monthly.bounds_containing(december).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        let (start, end) = PeriodKind::Yearly.bounds_containing(instant).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }
}
