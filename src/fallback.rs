// src/fallback.rs
// Decides when to give up on the streaming transport. Bounded retries avoid
// a reconnect storm; once the threshold is hit the session runs on the
// unary transport for the rest of its life.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Streaming,
    Fallback,
}

/// What the manager should do after a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Stay on streaming; schedule one reconnect after this delay.
    RetryAfter(Duration),
    /// Threshold reached: switch to the unary transport, permanently.
    SwitchToFallback,
}

#[derive(Debug)]
pub struct FallbackPolicy {
    mode: TransportMode,
    max_attempts: u32,
    retry_delay: Duration,
}

impl FallbackPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            mode: TransportMode::Streaming,
            max_attempts,
            retry_delay,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn is_fallback(&self) -> bool {
        self.mode == TransportMode::Fallback
    }

    /// Record one transport failure. `attempts` is the session's counter,
    /// incremented here; fallback is sticky once entered.
    pub fn on_failure(&mut self, attempts: &mut u32) -> FailureAction {
        if self.mode == TransportMode::Fallback {
            return FailureAction::SwitchToFallback;
        }
        *attempts += 1;
        if *attempts >= self.max_attempts {
            self.mode = TransportMode::Fallback;
            FailureAction::SwitchToFallback
        } else {
            FailureAction::RetryAfter(self.retry_delay)
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(1000))
    }
}
