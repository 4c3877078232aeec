use std::time::Duration;

/// How the client waits between failed connection attempts.
///
/// The default reproduces a plain fixed schedule: one second between
/// attempts, retrying forever. Setting `backoff_factor > 1.0` grows the
/// delay exponentially up to `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Consecutive failures tolerated before giving up (`None` = unbounded).
    ///
    /// The count restarts whenever the server acknowledges new bytes.
    pub max_attempts: Option<u32>,
    /// Spread each delay by ±25%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            backoff_factor: 1.0,
            max_attempts: None,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            ..Self::default()
        }
    }

    /// Exponential backoff from `initial_delay` up to `max_delay`, with jitter.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_factor: 2.0,
            max_attempts: None,
            jitter: true,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Calculates the delay before retrying after failure number `attempt`
    /// (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if !self.jitter {
            return Duration::from_secs_f64(capped);
        }

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let jitter = capped * 0.25 * jitter_offset(nanos);
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    /// Returns `true` once `failures` consecutive failures exhaust the budget.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

/// Maps sub-second nanoseconds onto `[-1.0, 1.0)`.
fn jitter_offset(subsec_nanos: u32) -> f64 {
    subsec_nanos as f64 / 1_000_000_000.0 * 2.0 - 1.0
}
