//! Date arithmetic shared by the scheduler and the renewal search.

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Utc};

/// Arithmetic mean of two instants. Repeated halving converges correctly
/// across month and year boundaries, unlike day-of-month truncation.
pub fn mid_date(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    let mid_ms = (a.timestamp_millis() + b.timestamp_millis()) / 2;
    DateTime::<Utc>::from_timestamp_millis(mid_ms).unwrap_or(a)
}

/// Same calendar day one year back, falling back to 365 days when the
/// calendar date does not exist (Feb 29).
pub fn one_year_earlier(d: DateTime<Utc>) -> DateTime<Utc> {
    d.with_year(d.year() - 1)
        .unwrap_or_else(|| d - chrono::Duration::days(365))
}

/// Tomorrow at a fixed hour, used for off-peak deferrals.
pub fn tomorrow_at(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Days::new(1);
    let at = tomorrow
        .and_hms_opt(hour.min(23), 0, 0)
        .unwrap_or_else(|| tomorrow.and_time(NaiveTime::MIN));
    Utc.from_utc_datetime(&at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn mid_date_crosses_year_boundary() {
        let mid = mid_date(utc("2024-12-01T00:00:00Z"), utc("2025-02-01T00:00:00Z"));
        assert_eq!(mid, utc("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn mid_date_is_symmetric() {
        let a = utc("2024-03-10T12:00:00Z");
        let b = utc("2024-07-22T06:00:00Z");
        assert_eq!(mid_date(a, b), mid_date(b, a));
    }

    #[test]
    fn one_year_earlier_handles_leap_day() {
        let d = one_year_earlier(utc("2024-02-29T10:00:00Z"));
        assert_eq!(d.year(), 2023);
    }

    #[test]
    fn tomorrow_at_lands_on_requested_hour() {
        let now = utc("2025-08-25T21:40:00Z");
        let at = tomorrow_at(now, 8);
        assert_eq!(at.date_naive(), utc("2025-08-26T00:00:00Z").date_naive());
        assert_eq!(at.hour(), 8);
    }
}
