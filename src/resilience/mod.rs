//! Resilience primitives: circuit breaker, adaptive rate limiter, and
//! the executor that composes them with retry and timeouts.

mod circuit_breaker;
mod executor;
mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use executor::ResilientExecutor;
pub use rate_limiter::{AdaptiveRateLimiter, RateLimiterMetrics};
