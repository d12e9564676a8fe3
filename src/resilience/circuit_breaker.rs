//! Circuit Breaker
//!
//! Three-state guard protecting a single provider connection. Failure
//! counters only move while closed; an open circuit rejects calls without
//! touching the network until the reset timeout elapses, after which
//! exactly one half-open trial is admitted at a time.

use std::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::types::CircuitBreakerConfig;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected without a network attempt.
    Open,
    /// One trial request probes recovery.
    HalfOpen,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker for one provider connection.
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Gate one attempt. Rejects with `CircuitOpen` while open (or while
    /// a half-open trial is already in flight); admits the single trial
    /// once the reset timeout has elapsed.
    pub fn preflight(&self) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();

        if state.state == CircuitState::Open {
            let cooled_down = state
                .last_failure_at
                .map(|at| at.elapsed() >= self.config.reset_timeout)
                .unwrap_or(true);
            if cooled_down {
                state.state = CircuitState::HalfOpen;
                state.success_count = 0;
                state.trial_in_flight = false;
                debug!(provider = %self.provider, "circuit half-open");
            } else {
                return Err(BridgeError::CircuitOpen {
                    provider: self.provider.clone(),
                });
            }
        }

        if state.state == CircuitState::HalfOpen {
            if state.trial_in_flight {
                return Err(BridgeError::CircuitOpen {
                    provider: self.provider.clone(),
                });
            }
            state.trial_in_flight = true;
        }

        Ok(())
    }

    /// Record a successful (or at least provider-healthy) attempt.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                state.trial_in_flight = false;
                state.success_count += 1;
                if state.success_count >= self.config.half_open_success_threshold {
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    debug!(provider = %self.provider, "circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a qualifying failure (5xx or network-level).
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                state.last_failure_at = Some(Instant::now());
                if state.failure_count >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    debug!(provider = %self.provider, "circuit open");
                }
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.trial_in_flight = false;
                state.success_count = 0;
                state.last_failure_at = Some(Instant::now());
                debug!(provider = %self.provider, "circuit re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    /// Release an admitted attempt that ended without a verdict
    /// (cancellation). No transition, no counter movement.
    pub fn record_trial_abort(&self) {
        let mut state = self.state.lock().unwrap();
        if state.state == CircuitState::HalfOpen {
            state.trial_in_flight = false;
        }
    }

    /// Current state, with the open-to-half-open transition applied.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock().unwrap();
        if state.state == CircuitState::Open {
            let cooled_down = state
                .last_failure_at
                .map(|at| at.elapsed() >= self.config.reset_timeout)
                .unwrap_or(true);
            if cooled_down {
                state.state = CircuitState::HalfOpen;
                state.success_count = 0;
                state.trial_in_flight = false;
            }
        }
        state.state
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().unwrap().failure_count
    }

    /// Force the breaker back to closed with cleared counters.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.success_count = 0;
        state.last_failure_at = None;
        state.trial_in_flight = false;
    }
}
