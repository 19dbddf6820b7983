use backfill_domain::NotificationPriority;
use chrono::Duration;

/// Exponential backoff: `base × 2^(n−1)` after the n-th failed attempt, capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(30);
        let factor = 1i32 << exponent;
        match self.base.checked_mul(factor) {
            Some(delay) if delay < self.cap => delay,
            _ => self.cap,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::seconds(60),
            cap: Duration::seconds(3600),
        }
    }
}

/// Everything the dispatcher needs to decide between retrying and giving up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    /// Courtesy notices nobody is blocked on
    pub low_priority_max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub send_timeout: std::time::Duration,
}

impl DeliveryPolicy {
    pub fn max_attempts_for(&self, priority: NotificationPriority) -> u32 {
        match priority {
            NotificationPriority::Normal => self.max_attempts,
            NotificationPriority::Low => self.low_priority_max_attempts,
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            low_priority_max_attempts: 2,
            backoff: BackoffPolicy::default(),
            send_timeout: std::time::Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let backoff = BackoffPolicy::new(Duration::seconds(60), Duration::seconds(300));
        assert_eq!(backoff.delay_after(1), Duration::seconds(60));
        assert_eq!(backoff.delay_after(2), Duration::seconds(120));
        assert_eq!(backoff.delay_after(3), Duration::seconds(240));
        assert_eq!(backoff.delay_after(4), Duration::seconds(300));
        assert_eq!(backoff.delay_after(u32::MAX), Duration::seconds(300));
    }

    #[test]
    fn test_low_priority_gets_fewer_attempts() {
        let policy = DeliveryPolicy::default();
        assert_eq!(policy.max_attempts_for(NotificationPriority::Normal), 3);
        assert_eq!(policy.max_attempts_for(NotificationPriority::Low), 2);
    }
}
