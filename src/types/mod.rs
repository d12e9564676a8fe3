//! Bridge Data Types
//!
//! Credentials, sessions, and per-provider configuration.

mod config;
mod credential;
mod session;

pub use config::{
    BridgeConfig, CircuitBreakerConfig, ProviderAuthConfig, RateLimitConfig, ResetTimeExtractor,
    ResilienceConfig, RetryConfig, DEFAULT_TIMEOUT,
};
pub use credential::{
    Credential, HeaderSpec, OAuthGrantType, TokenExtractor, DEFAULT_AUTH_HEADER,
    DEFAULT_TOKEN_PREFIX,
};
pub use session::AuthenticationResult;

pub(crate) use credential::expose;
pub(crate) use session::SessionState;
