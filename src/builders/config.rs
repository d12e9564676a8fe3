//! Configuration Builder
//!
//! Fluent builder for per-provider bridge configuration.

use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::error::{BridgeError, ConfigurationError};
use crate::types::{
    BridgeConfig, CircuitBreakerConfig, Credential, ProviderAuthConfig, RateLimitConfig,
    ResetTimeExtractor, ResilienceConfig, RetryConfig,
};

/// Bridge configuration builder.
#[derive(Default)]
pub struct BridgeConfigBuilder {
    provider: Option<String>,
    base_url: Option<String>,
    health_check_endpoint: Option<String>,
    credentials: Vec<Credential>,
    static_headers: HashMap<String, String>,
    retry: RetryConfig,
    circuit: CircuitBreakerConfig,
    rate_limit: RateLimitConfig,
    timeout: Option<Duration>,
}

impl BridgeConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider name.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the base URL joined with relative request paths.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the relative path probed by `check_health`.
    pub fn health_check_endpoint(mut self, path: impl Into<String>) -> Self {
        self.health_check_endpoint = Some(path.into());
        self
    }

    /// Add a credential. The first added is the implicit default.
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Add a static header merged into every authenticated request.
    pub fn static_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_headers.insert(name.into(), value.into());
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set total attempts, the first included.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    /// Set the circuit breaker thresholds.
    pub fn circuit_breaker(mut self, circuit: CircuitBreakerConfig) -> Self {
        self.circuit = circuit;
        self
    }

    /// Set the rate limiter tuning.
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the provider's per-minute quota.
    pub fn max_requests_per_minute(mut self, quota: u32) -> Self {
        self.rate_limit.max_requests_per_minute = quota;
        self
    }

    /// Set a provider-specific reset header consulted before `Retry-After`.
    pub fn retry_after_header(mut self, header: impl Into<String>) -> Self {
        self.rate_limit.retry_after_header = Some(header.into());
        self
    }

    /// Set a custom reset-time extractor, consulted before any header.
    pub fn extract_reset_time(mut self, extractor: ResetTimeExtractor) -> Self {
        self.rate_limit.extract_reset_time = Some(extractor);
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the bridge configuration.
    pub fn build(self) -> Result<BridgeConfig, BridgeError> {
        let provider = self.provider.ok_or_else(|| {
            BridgeError::Configuration(ConfigurationError::MissingRequired {
                field: "provider".to_string(),
            })
        })?;

        if let Some(url) = &self.base_url {
            Url::parse(url).map_err(|_| {
                BridgeError::Configuration(ConfigurationError::InvalidUrl { url: url.clone() })
            })?;
        }

        if self.retry.max_attempts == 0 {
            return Err(BridgeError::Configuration(ConfigurationError::InvalidConfig {
                message: "max_attempts must be at least 1".to_string(),
            }));
        }

        if self.retry.backoff_factor < 1.0 || self.rate_limit.backoff_factor < 1.0 {
            return Err(BridgeError::Configuration(ConfigurationError::InvalidConfig {
                message: "backoff_factor must be at least 1.0".to_string(),
            }));
        }

        if self.circuit.failure_threshold == 0 {
            return Err(BridgeError::Configuration(ConfigurationError::InvalidConfig {
                message: "failure_threshold must be at least 1".to_string(),
            }));
        }

        if self.rate_limit.max_requests_per_minute == 0 {
            return Err(BridgeError::Configuration(ConfigurationError::InvalidConfig {
                message: "max_requests_per_minute must be at least 1".to_string(),
            }));
        }

        let resilience = ResilienceConfig {
            retry: self.retry,
            circuit: self.circuit,
            rate_limit: self.rate_limit,
            timeout: self.timeout.unwrap_or(crate::types::DEFAULT_TIMEOUT),
        };

        Ok(BridgeConfig {
            provider,
            auth: ProviderAuthConfig {
                credentials: self.credentials,
                static_headers: self.static_headers,
                base_url: self.base_url,
            },
            resilience,
            health_check_endpoint: self.health_check_endpoint,
        })
    }
}

/// Convenience function to create a builder.
pub fn bridge_config() -> BridgeConfigBuilder {
    BridgeConfigBuilder::new()
}
