use std::time::Duration;

// ============================================================================
// Exponential Backoff Policy
// ============================================================================
//
// Pure delay-sequence producer for the consumer retry loop. The policy never
// sleeps itself; callers drive the sequence so tests can run it under a
// paused clock.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier applied to each subsequent delay
    pub multiplier: f64,
    /// Ceiling for any single delay
    pub max_interval: Duration,
    /// Number of retries after the initial attempt
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(1000),
            multiplier: 2.0,
            max_interval: Duration::from_millis(2000),
            max_retries: 2,
        }
    }
}

impl BackoffPolicy {
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            initial_interval,
            multiplier,
            max_interval,
            max_retries,
        }
    }

    /// The bounded delay sequence: `d_0 = initial`,
    /// `d_i = min(d_{i-1} * multiplier, max)`, stopping after `max_retries`
    /// delays.
    pub fn delays(&self) -> Delays {
        Delays {
            next: self.initial_interval,
            remaining: self.max_retries,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
        }
    }

    /// Total processing attempts for a persistently failing record,
    /// including the first.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

pub struct Delays {
    next: Duration,
    remaining: u32,
    multiplier: f64,
    max_interval: Duration,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.next.min(self.max_interval);
        self.next = Duration::from_millis(
            ((current.as_millis() as f64) * self.multiplier) as u64,
        )
        .min(self.max_interval);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_yields_one_and_two_seconds() {
        let delays: Vec<_> = BackoffPolicy::default().delays().collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
        assert_eq!(BackoffPolicy::default().total_attempts(), 3);
    }

    #[test]
    fn delays_are_capped_at_max_interval() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(100),
            10.0,
            Duration::from_millis(250),
            4,
        );
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(250),
                Duration::from_millis(250),
                Duration::from_millis(250),
            ]
        );
    }

    #[test]
    fn zero_retries_yields_no_delays() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), 2.0, Duration::from_secs(1), 0);
        assert_eq!(policy.delays().count(), 0);
        assert_eq!(policy.total_attempts(), 1);
    }
}
