//! Backoff strategies for reconnect loops.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Initial backoff duration.
    pub initial: Duration,

    /// Maximum backoff duration.
    pub max: Duration,

    /// Multiplier for each attempt.
    pub multiplier: f64,

    /// Whether to add jitter.
    pub jitter: bool,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set the multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (zero-based).
    ///
    /// With jitter the capped delay is scaled by a factor in `[0.5, 1.5)`, then capped
    /// again so the result never exceeds `max`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max.as_secs_f64();
        let capped = if base.is_finite() { base.min(max) } else { max };

        let delay = if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
            (capped * factor).min(max)
        } else {
            capped
        };

        Duration::from_secs_f64(delay.max(0.0))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Pick a random duration in `(base * (1 - max_fraction), base]`.
///
/// Used to spread the first heartbeat of many connections across the interval.
#[must_use]
pub fn jittered_below(base: Duration, max_fraction: f64) -> Duration {
    let fraction = max_fraction.clamp(0.0, 1.0);
    if fraction == 0.0 {
        return base;
    }
    let cut: f64 = rand::thread_rng().gen_range(0.0..fraction);
    base.mul_f64(1.0 - cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60)).with_jitter(false);

        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(60)); // Capped
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(5));
        for attempt in 0..20 {
            let delay = backoff.delay_for_attempt(attempt);
            assert!(delay >= Duration::from_secs(1), "attempt {attempt}: {delay:?}");
            assert!(delay <= Duration::from_secs(5), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_jittered_below() {
        let base = Duration::from_millis(41_250);
        for _ in 0..100 {
            let d = jittered_below(base, 0.1);
            assert!(d <= base);
            assert!(d > base.mul_f64(0.9) - Duration::from_millis(1));
        }
        assert_eq!(jittered_below(base, 0.0), base);
    }
}
