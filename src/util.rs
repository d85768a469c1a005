//! Small collaborators: the fork retry policy and the path chooser

use std::time::Duration;

/// Bounded retry policy for process creation under resource pressure.
///
/// Replaces ad hoc retry loops with a named policy: a capped number of
/// attempts with optional exponential backoff. Both probe paths share
/// one instance.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
    /// Whether to use exponential backoff
    pub exponential_backoff: bool,
    /// Maximum delay for exponential backoff
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(10),
            exponential_backoff: true,
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// The delay to sleep after a failed attempt, stepping the backoff.
    pub fn next_delay(&self, current: Duration) -> Duration {
        if self.exponential_backoff {
            std::cmp::min(current * 2, self.max_delay)
        } else {
            current
        }
    }
}

/// Pick one of the two delivery paths, uniformly.
pub fn coin_flip() -> bool {
    rand::random()
}
