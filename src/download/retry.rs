//! Attempt budget for downloads.

use std::time::Duration;

use crate::error::{Error, Result};

/// Max attempts and the fixed wait before every attempt after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; it must be at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::configuration("max attempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait before attempt `index` (zero-based); none before the first.
    pub fn delay_before(&self, index: u32) -> Option<Duration> {
        (index > 0).then_some(self.delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::ZERO),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_delay_only_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2)).unwrap();
        assert_eq!(policy.delay_before(0), None);
        assert_eq!(policy.delay_before(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_before(2), Some(Duration::from_secs(2)));
    }
}
