//! Test Management Integration Bridge
//!
//! Fault-tolerant outbound communication layer for test-management
//! platform APIs (Zephyr, qTest, and similar providers).
//!
//! # Features
//!
//! - Three authentication strategies (static token, username/password
//!   login, OAuth2 client credentials and password grants) with a
//!   per-provider session cache and refresh-token exchange
//! - Circuit breaker (Closed/Open/HalfOpen) with single-trial half-open
//!   probing
//! - Bounded retry with exponential backoff and per-attempt timeouts
//! - Adaptive rate limiting with `Retry-After` interpretation and
//!   quota-pressure backoff
//! - Single 401-triggered re-authentication and replay per call
//! - Cancellation propagated through every outbound attempt
//!
//! # Example
//!
//! ```rust,ignore
//! use testmgmt_integration::{bridge_config, Credential, ProviderBridge, ReqwestHttpTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = bridge_config()
//!         .provider("zephyr")
//!         .base_url("https://zephyr.example/rest/atm/1.0")
//!         .credential(Credential::token("my-api-token"))
//!         .max_requests_per_minute(120)
//!         .build()?;
//!
//!     let transport = Arc::new(ReqwestHttpTransport::new()?);
//!     let bridge = ProviderBridge::new(config, transport);
//!
//!     let response = bridge.get("/testrun/DEMO-C1").await?;
//!     println!("{}", response.body);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several sub-modules:
//!
//! - `types`: credentials, sessions, and per-provider configuration
//! - `error`: error hierarchy with centralized failure classification
//! - `transport`: HTTP transport trait with reqwest and mock implementations
//! - `auth`: credential resolution and session caching
//! - `resilience`: circuit breaker, adaptive rate limiter, and the
//!   retrying executor that composes them
//! - `bridge`: per-provider facade exposing the verb-level API
//! - `builders`: fluent configuration builder

pub mod auth;
pub mod bridge;
pub mod builders;
pub mod error;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export the facade
pub use bridge::{BridgeMetrics, HealthState, ProviderBridge};

// Re-export builders
pub use builders::{bridge_config, BridgeConfigBuilder};

// Re-export errors
pub use error::{
    AuthenticationError, BridgeError, BridgeResult, ConfigurationError, HttpError, ProtocolError,
    TransportError,
};

// Re-export types
pub use types::{
    AuthenticationResult, BridgeConfig, CircuitBreakerConfig, Credential, HeaderSpec,
    OAuthGrantType, ProviderAuthConfig, RateLimitConfig, ResetTimeExtractor, ResilienceConfig,
    RetryConfig, TokenExtractor,
};

// Re-export transport
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport,
};

// Re-export auth and resilience components
pub use auth::AuthenticationHandler;
pub use resilience::{AdaptiveRateLimiter, CircuitBreaker, CircuitState, RateLimiterMetrics, ResilientExecutor};
