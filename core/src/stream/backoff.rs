use std::time::Duration;

/// Default pause between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How long the client waits before each reconnect attempt.
///
/// There is no attempt limit under either policy; the client retries until it
/// is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt.
    Fixed { delay: Duration },
    /// `base * 2^(failures - 1)`, capped at `max`. Resets once a connection
    /// opens.
    Exponential { base: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt after `failures` consecutive failed or
    /// lost connections (1-based; 0 is treated as 1).
    pub fn delay_for(&self, failures: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed { delay } => delay,
            ReconnectPolicy::Exponential { base, max } => {
                let shift = failures.saturating_sub(1).min(30);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}
