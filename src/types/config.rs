//! Configuration Types
//!
//! Per-provider configuration for authentication, resilience, and rate
//! limiting, supplied by the embedding application at construction time.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::HttpError;
use crate::types::Credential;

/// Pulls a quota reset time out of a rate-limited error response.
/// Consulted before any header-based extraction.
pub type ResetTimeExtractor = Arc<dyn Fn(&HttpError) -> Option<DateTime<Utc>> + Send + Sync>;

/// Retry policy applied around each permitted attempt.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total attempts, the first included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive qualifying failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open trial.
    pub reset_timeout: Duration,
    /// Successes required in half-open before closing.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 1,
        }
    }
}

/// Adaptive rate limiter tuning for one provider.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Provider quota used by the adaptive backoff check.
    pub max_requests_per_minute: u32,
    /// Minimum spacing between permitted calls at rest.
    pub initial_delay: Duration,
    /// Ceiling for adaptively grown spacing.
    pub max_delay: Duration,
    /// Multiplier applied to the spacing under quota pressure.
    pub backoff_factor: f64,
    /// Fraction of the per-minute quota that triggers adaptive backoff.
    pub backoff_threshold: f64,
    /// Statuses treated as provider-signaled rate limiting.
    pub rate_limit_status_codes: Vec<u16>,
    /// Provider-specific reset header, consulted before `Retry-After`.
    pub retry_after_header: Option<String>,
    /// Custom reset-time extractor, consulted before any header.
    pub extract_reset_time: Option<ResetTimeExtractor>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            backoff_threshold: 0.8,
            rate_limit_status_codes: vec![429],
            retry_after_header: None,
            extract_reset_time: None,
        }
    }
}

impl std::fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("max_requests_per_minute", &self.max_requests_per_minute)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("backoff_threshold", &self.backoff_threshold)
            .field("rate_limit_status_codes", &self.rate_limit_status_codes)
            .field("retry_after_header", &self.retry_after_header)
            .field(
                "extract_reset_time",
                &self.extract_reset_time.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

/// Full resilience configuration for one provider connection.
#[derive(Clone, Debug)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub circuit: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    /// Per-attempt bound; a logical call may span several attempts.
    pub timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authentication defaults registered for a provider name.
#[derive(Clone, Debug, Default)]
pub struct ProviderAuthConfig {
    /// Credentials in resolution order; the first is the implicit default.
    pub credentials: Vec<Credential>,
    /// Static headers merged into every authenticated request.
    pub static_headers: HashMap<String, String>,
    /// Base URL for relative request paths.
    pub base_url: Option<String>,
}

/// Complete configuration for one provider bridge.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Provider name; keys all per-provider state.
    pub provider: String,
    pub auth: ProviderAuthConfig,
    pub resilience: ResilienceConfig,
    /// Relative path probed by `check_health`.
    pub health_check_endpoint: Option<String>,
}

impl BridgeConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            auth: ProviderAuthConfig::default(),
            resilience: ResilienceConfig::new(),
            health_check_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_factor, 2.0);
    }

    #[test]
    fn test_circuit_config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.half_open_success_threshold, 1);
        assert_eq!(config.reset_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.rate_limit_status_codes, vec![429]);
        assert!(config.retry_after_header.is_none());
        assert_eq!(config.backoff_threshold, 0.8);
    }

    #[test]
    fn test_rate_limit_config_debug_elides_extractor() {
        let mut config = RateLimitConfig::default();
        config.extract_reset_time = Some(Arc::new(|_| None));
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("<fn>"));
    }
}
