//! Retry policy for upload dispatch
//!
//! Only transport-level failures (timeouts, connection errors, 5xx) are
//! retried. Delays grow exponentially and are capped.

use std::time::Duration;

/// Default number of dispatch attempts, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (in milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 1_000;

/// Maximum backoff delay (in milliseconds)
const MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Delay strategy between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    ExponentialBackoff {
        base_delay: Duration,
        max_delay: Duration,
    },
    /// Retry with fixed delay
    FixedDelay { delay: Duration },
    /// Retry immediately
    Immediate,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
        }
    }
}

impl RetryStrategy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::ExponentialBackoff {
                base_delay,
                max_delay,
            } => {
                let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
                base_delay.saturating_mul(factor).min(*max_delay)
            }
            Self::FixedDelay { delay } => *delay,
            Self::Immediate => Duration::ZERO,
        }
    }
}

/// Bounded retry policy for upload dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1
    pub max_attempts: u32,
    pub strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            strategy: RetryStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            strategy: RetryStrategy::Immediate,
        }
    }

    /// Policy with immediate retries, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Immediate,
        }
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.strategy.calculate_delay(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let strategy = RetryStrategy::default();
        assert_eq!(strategy.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(2), Duration::from_secs(2));
        assert_eq!(strategy.calculate_delay(3), Duration::from_secs(4));
        assert_eq!(strategy.calculate_delay(5), Duration::from_secs(10));
        assert_eq!(strategy.calculate_delay(64), Duration::from_secs(10));
    }

    #[test]
    fn test_fixed_and_immediate() {
        let fixed = RetryStrategy::FixedDelay {
            delay: Duration::from_millis(250),
        };
        assert_eq!(fixed.calculate_delay(7), Duration::from_millis(250));
        assert_eq!(RetryStrategy::Immediate.calculate_delay(3), Duration::ZERO);
    }

    #[test]
    fn test_attempt_bound() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        let once = RetryPolicy::no_retry();
        assert!(!once.should_retry(1));

        let zero = RetryPolicy::immediate(0);
        assert!(!zero.should_retry(1));
    }
}
