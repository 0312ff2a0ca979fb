use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Injected time source. Production code uses [`SystemClock`]; tests use
/// [`FixedClock`] so timestamps are deterministic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Canonical stored form: RFC 3339 UTC with millisecond precision.
    /// Uniform width keeps lexicographic order equal to chronological order.
    fn now_str(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_is_settable() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::at(t0);
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::hours(1));
        assert_eq!(clock.now(), t0 + Duration::hours(1));
    }

    #[test]
    fn now_str_has_uniform_width() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::at(t0);
        assert_eq!(clock.now_str(), "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn now_str_orders_lexicographically() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::at(t0);
        let a = clock.now_str();
        clock.advance(Duration::milliseconds(5));
        let b = clock.now_str();
        assert!(a < b);
    }
}
