use backfill_domain::analytics::round1;
use backfill_domain::{Booking, CustomerReliabilityRow, ReliabilityHistory};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Most and least reliable customers among those with at least one outcome.
/// Both lists are fully ordered so regeneration is reproducible.
pub fn reliability_lists(bookings: &[Booking], size: usize) -> (Vec<CustomerReliabilityRow>, Vec<CustomerReliabilityRow>) {
    let mut by_customer: BTreeMap<Uuid, Vec<&Booking>> = BTreeMap::new();
    for booking in bookings {
        by_customer.entry(booking.customer_id).or_default().push(booking);
    }

    let rows: Vec<CustomerReliabilityRow> = by_customer
        .into_iter()
        .filter_map(|(customer_id, bookings)| {
            let history = ReliabilityHistory::from_bookings(bookings);
            history.reliability_percent().map(|percent| CustomerReliabilityRow {
                customer_id,
                completions: history.completions,
                no_shows: history.no_shows,
                reliability_percent: round1(percent),
            })
        })
        .collect();

    let mut top = rows.clone();
    top.sort_by(|a, b| {
        cmp_f64(b.reliability_percent, a.reliability_percent)
            .then((b.completions + b.no_shows).cmp(&(a.completions + a.no_shows)))
            .then(a.customer_id.cmp(&b.customer_id))
    });
    top.truncate(size);

    let mut least = rows;
    least.sort_by(|a, b| {
        cmp_f64(a.reliability_percent, b.reliability_percent)
            .then(b.no_shows.cmp(&a.no_shows))
            .then(a.customer_id.cmp(&b.customer_id))
    });
    least.truncate(size);

    (top, least)
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backfill_domain::{BookingSource, BookingStatus, ContactPoint, NewBooking};
    use chrono::{TimeZone, Utc};

    fn booking(customer_id: Uuid, status: BookingStatus) -> Booking {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut booking = Booking::new(
            NewBooking {
                salon_id: Uuid::nil(),
                customer_id,
                service_id: Uuid::nil(),
                resource_id: Uuid::new_v4(),
                contact: ContactPoint::sms("+15550003333"),
                starts_at: now,
                duration_minutes: 30,
                price_cents: 2500,
            },
            BookingSource::Direct,
            now,
        );
        booking.status = status;
        booking
    }

    #[test]
    fn test_lists_skip_customers_without_outcomes() {
        let (steady, flaky, fresh) = (Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3));
        let bookings = vec![
            booking(steady, BookingStatus::Completed),
            booking(steady, BookingStatus::Completed),
            booking(flaky, BookingStatus::Completed),
            booking(flaky, BookingStatus::NoShow),
            booking(fresh, BookingStatus::Confirmed),
        ];

        let (top, least) = reliability_lists(&bookings, 5);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].customer_id, steady);
        assert_eq!(top[0].reliability_percent, 100.0);
        assert_eq!(least[0].customer_id, flaky);
        assert_eq!(least[0].reliability_percent, 50.0);
    }

    #[test]
    fn test_lists_are_truncated() {
        let bookings: Vec<Booking> = (0..4)
            .map(|n| booking(Uuid::from_u128(n), BookingStatus::Completed))
            .collect();
        let (top, least) = reliability_lists(&bookings, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(least.len(), 2);
        assert_eq!(top[0].customer_id, Uuid::from_u128(0));
    }
}
