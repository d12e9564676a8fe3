//! Session Types
//!
//! Authentication results and cached per-provider session state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::time::Instant;

use crate::types::Credential;

/// Outcome of a successful authentication call.
///
/// Produced fresh per authentication round-trip; failure is expressed
/// through `Result`, not a flag.
#[derive(Clone, Debug)]
pub struct AuthenticationResult {
    /// Resolved access/session token.
    pub token: String,
    /// Refresh token, when the provider issued one.
    pub refresh_token: Option<String>,
    /// Fully resolved headers to merge into outgoing requests.
    pub headers: HashMap<String, String>,
    /// Token type as reported by the provider (default "Bearer").
    pub token_type: String,
    /// Wall-clock expiry, when known.
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider-reported lifetime in seconds, when known.
    pub expires_in_secs: Option<u64>,
}

/// Cached session for one provider. At most one per provider name;
/// replaced atomically on refresh, deleted on logout.
#[derive(Clone, Debug)]
pub(crate) struct SessionState {
    pub token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub headers: HashMap<String, String>,
    /// Monotonic expiry deadline; `None` means the session never expires.
    pub expires_at: Option<Instant>,
    /// Wall-clock expiry mirrored into results returned from cache.
    pub expires_at_utc: Option<DateTime<Utc>>,
    /// Provider-reported lifetime in seconds, when known.
    pub expires_in_secs: Option<u64>,
    /// The credential that produced this session, kept for refresh and
    /// re-authentication.
    pub credential: Credential,
}

impl SessionState {
    /// A session is valid until its expiry deadline has passed.
    pub fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }

    pub fn to_result(&self) -> AuthenticationResult {
        AuthenticationResult {
            token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
            headers: self.headers.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at_utc,
            expires_in_secs: self.expires_in_secs,
        }
    }
}
