/// Bounded backoff for retrying transient failures
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays (1.0 = fixed delay)
    pub backoff_multiplier: f64,
    /// Add random jitter to each delay (±30%)
    pub jitter: bool,
    /// Consecutive retries allowed before giving up (`None` = unlimited)
    pub max_retries: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

impl BackoffConfig {
    /// Same delay on every retry, never giving up
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
            jitter: false,
            max_retries: None,
        }
    }

    /// Doubling delay starting at `initial`, capped at `max`
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial_backoff: initial,
            max_backoff: max.max(initial),
            backoff_multiplier: 2.0,
            jitter: true,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Stateful backoff sequence
///
/// Each call to [`Backoff::next_delay`] counts one retry. The consecutive
/// count resets on success; the total count never does, so callers can
/// export it as a metric.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    consecutive: u32,
    total: u64,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_backoff;
        Self {
            config,
            current,
            consecutive: 0,
            total: 0,
        }
    }

    /// Delay to wait before the next retry, or `None` once retries are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries {
            if self.consecutive >= max {
                return None;
            }
        }

        self.consecutive += 1;
        self.total += 1;

        let delay = apply_jitter(self.current, self.config.jitter).min(self.config.max_backoff);

        self.current = Duration::from_millis(
            ((self.current.as_millis() as f64 * self.config.backoff_multiplier)
                .min(self.config.max_backoff.as_millis() as f64)) as u64,
        );

        Some(delay)
    }

    /// Start over after a successful attempt
    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.current = self.config.initial_backoff;
    }

    /// Retries since the last reset
    pub fn consecutive_retries(&self) -> u32 {
        self.consecutive
    }

    /// Retries over the lifetime of this backoff
    pub fn total_retries(&self) -> u64 {
        self.total
    }
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let mut rng = rand::thread_rng();
        let jitter_factor = 1.0 + rng.gen_range(-0.3..0.3); // ±30%
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff_repeats_same_delay() {
        let mut backoff = Backoff::new(BackoffConfig::fixed(Duration::from_secs(1)));

        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        }
        assert_eq!(backoff.consecutive_retries(), 5);
        assert_eq!(backoff.total_retries(), 5);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let config = BackoffConfig::exponential(Duration::from_millis(10), Duration::from_millis(50))
            .with_jitter(false);
        let mut backoff = Backoff::new(config);

        let delays: Vec<_> = (0..5).filter_map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(50),
                Duration::from_millis(50),
            ]
        );
    }

    #[test]
    fn test_max_retries_exhausts() {
        let config =
            BackoffConfig::fixed(Duration::from_millis(1)).with_max_retries(Some(2));
        let mut backoff = Backoff::new(config);

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.total_retries(), 2);
    }

    #[test]
    fn test_reset_restarts_sequence_but_keeps_total() {
        let config = BackoffConfig::exponential(Duration::from_millis(10), Duration::from_secs(1))
            .with_jitter(false)
            .with_max_retries(Some(2));
        let mut backoff = Backoff::new(config);

        backoff.next_delay();
        backoff.next_delay();
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.consecutive_retries(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.total_retries(), 3);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = BackoffConfig::fixed(Duration::from_millis(100)).with_jitter(true);
        let mut backoff = Backoff::new(config);

        for _ in 0..50 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= Duration::from_millis(70));
            assert!(delay <= Duration::from_millis(100));
        }
    }
}
