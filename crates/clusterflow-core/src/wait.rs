//! Bounded wait policy
//!
//! Polling waits are expressed as a fixed interval plus a wall-clock
//! ceiling; the derived attempt count bounds the number of provider
//! queries and keeps worst-case blocking deterministic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll interval + ceiling for a bounded wait
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl WaitPolicy {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }

    /// Maximum number of poll attempts: `max_wait / poll_interval`,
    /// never less than one.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.poll_interval.as_secs().max(1);
        ((self.max_wait.as_secs() / interval) as u32).max(1)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(120),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_derives_24_attempts() {
        assert_eq!(WaitPolicy::default().max_attempts(), 24);
    }

    #[test]
    fn test_attempts_never_zero() {
        let policy = WaitPolicy::new(Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(policy.max_attempts(), 1);
    }
}
