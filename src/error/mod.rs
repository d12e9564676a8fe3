//! Bridge Error Types
//!
//! Error hierarchy for the outbound provider bridge. All retry and
//! circuit-breaker classification lives here so the executor and the
//! rate limiter reach identical decisions about the same failure.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Root error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Circuit breaker is open for provider {provider}")]
    CircuitOpen { provider: String },

    #[error("Rate limited for provider {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => Some(e.status),
            Self::Authentication(e) => e.status(),
            _ => None,
        }
    }

    /// Whether the failing attempt may be retried.
    ///
    /// Retryable: no response received (connection failure, timeout),
    /// HTTP 5xx, HTTP 429. Cancellation, circuit rejection, 401 and the
    /// remaining 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Http(e) => e.status >= 500 || e.status == 429,
            Self::Authentication(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the failure counts toward opening the circuit breaker.
    ///
    /// Only provider-side trouble qualifies: 5xx responses and
    /// network-level failures (a timed-out attempt included). Quota
    /// rejections and caller mistakes do not.
    pub fn counts_toward_circuit(&self) -> bool {
        match self {
            Self::Transport(TransportError::ConnectionFailed { .. }) => true,
            Self::Transport(TransportError::Timeout { .. }) => true,
            Self::Http(e) => e.status >= 500,
            _ => false,
        }
    }

    /// Whether the attempt was externally cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled))
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Authentication failure against a provider's identity endpoint.
#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("No credential resolvable for provider {provider}")]
    MissingCredential { provider: String },

    #[error("Provider {provider} rejected authentication (status {status}): {details}")]
    Rejected {
        provider: String,
        status: u16,
        details: String,
    },

    #[error("No token found in login response for provider {provider}")]
    MissingToken { provider: String },

    #[error("Authentication transport failure for provider {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("Invalid credential for provider {provider}: {message}")]
    InvalidCredential { provider: String, message: String },
}

impl AuthenticationError {
    /// Provider this failure belongs to.
    pub fn provider(&self) -> &str {
        match self {
            Self::MissingCredential { provider }
            | Self::Rejected { provider, .. }
            | Self::MissingToken { provider }
            | Self::Network { provider, .. }
            | Self::InvalidCredential { provider, .. } => provider,
        }
    }

    /// HTTP status returned by the identity provider, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure happened below the HTTP layer.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Network failures and provider-side 5xx rejections may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Network-level failure: no HTTP response was received.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }
}

/// An HTTP error response: the provider answered with a non-success status.
///
/// Headers and body are preserved so rate-limit handling can read
/// `Retry-After` (or a provider-specific header) off the failure.
#[derive(Error, Debug, Clone)]
#[error("HTTP {status}: {body}")]
pub struct HttpError {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpError {
    /// Header lookup, case-insensitive (headers are stored lowercased).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

/// Response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
