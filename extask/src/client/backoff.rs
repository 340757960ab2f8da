use super::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Backoff state of the poll loop.
///
/// Each empty or failed cycle raises the level by one; a cycle that returned
/// work resets it. The delay at level `n > 0` is
/// `initial * factor^(n-1)`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    level: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, level: 0 }
    }

    pub fn reset(&mut self) {
        self.level = 0;
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    /// Raises the level and returns the delay for it, without jitter.
    pub fn next_delay(&mut self) -> Duration {
        self.level = self.level.saturating_add(1);
        self.delay()
    }

    /// Delay at the current level, without jitter.
    pub fn delay(&self) -> Duration {
        if self.level == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(self.level - 1).unwrap_or(i32::MAX);
        let millis = self.config.initial_ms as f64 * self.config.factor.powi(exponent);
        Duration::from_millis(millis.min(self.config.max_ms as f64) as u64)
    }

    /// Adds up to `jitter * delay` of random extra wait.
    pub fn jittered(&self, delay: Duration) -> Duration {
        let spread = (delay.as_millis() as f64 * self.config.jitter) as u64;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_double_until_capped() {
        let mut backoff = ExponentialBackoff::new(BackoffConfig::default());
        assert_eq!(backoff.delay(), Duration::ZERO);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2_000));
        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.delay(), Duration::from_secs(60));
        backoff.reset();
        assert_eq!(backoff.delay(), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let backoff = ExponentialBackoff::new(BackoffConfig::default());
        for _ in 0..50 {
            let d = backoff.jittered(Duration::from_millis(1_000));
            assert!(d >= Duration::from_millis(1_000) && d <= Duration::from_millis(1_100));
        }
    }
}
