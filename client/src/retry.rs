use std::{num::NonZeroUsize, time::Duration};

/// How long to wait between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Doubles after every attempt, up to `max`.
    Exponential { initial: Duration, max: Duration },
}

/// When and how often a failed request is tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// Unbounded when `None`.
    pub max_attempts: Option<NonZeroUsize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::Fixed(Duration::from_secs(1)),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// The delay to wait after the failed attempt number `attempt` (starting at 1).
    ///
    /// # Returns
    /// `None` once the attempts are exhausted.
    pub fn delay(&self, attempt: usize) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max.get()) {
            return None;
        }

        let delay = match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let exp = attempt.saturating_sub(1).min(31) as u32;
                initial.saturating_mul(1 << exp).min(max)
            }
        };

        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded_one_second() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay(10_000), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exponential_caps() {
        let policy = RetryPolicy {
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_millis(500),
            },
            max_attempts: None,
        };

        let delays: Vec<_> = (1..=5).map(|a| policy.delay(a).unwrap().as_millis()).collect();
        assert_eq!(delays, [100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_bounded_attempts() {
        let policy = RetryPolicy {
            max_attempts: NonZeroUsize::new(3),
            ..RetryPolicy::default()
        };

        assert!(policy.delay(2).is_some());
        assert!(policy.delay(3).is_none());
    }
}
