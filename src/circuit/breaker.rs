//! Status store circuit breaker
//!
//! Two states only. A store failure opens the breaker for a fixed cooldown;
//! the first check after the cooldown closes it again and the caller simply
//! retries the store. There is no half-open probing and no manual reset.

use std::time::Duration;

use tokio::time::Instant;

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { remaining: Duration },
}

/// Cooldown-based circuit breaker
///
/// Not synchronized; the owner keeps it behind its own lock.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    cooldown: Duration,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            open_until: None,
        }
    }

    /// Whether calls should skip the store at `now`
    ///
    /// Clears the open state once the cooldown has elapsed.
    pub fn is_open(&mut self, now: Instant) -> bool {
        match self.open_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.open_until = None;
                false
            }
            None => false,
        }
    }

    /// Record a store failure observed at `now`
    pub fn trip(&mut self, now: Instant) {
        self.open_until = Some(now + self.cooldown);
    }

    pub fn state(&self, now: Instant) -> CircuitState {
        match self.open_until {
            Some(until) if now < until => CircuitState::Open {
                remaining: until - now,
            },
            _ => CircuitState::Closed,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
