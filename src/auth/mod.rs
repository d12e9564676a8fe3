//! Authentication Handler
//!
//! Resolves credentials into request headers, owns the per-provider
//! session cache, and refreshes expired sessions. Per-provider session
//! slots are guarded by an async mutex, so concurrent callers observing
//! an expired session coalesce onto a single in-flight login instead of
//! issuing parallel ones. Different providers never serialize against
//! each other.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AuthenticationError, BridgeError, BridgeResult};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::types::{
    expose, AuthenticationResult, Credential, HeaderSpec, OAuthGrantType, ProviderAuthConfig,
    SessionState,
};

type SessionSlot = Arc<tokio::sync::Mutex<Option<SessionState>>>;

/// Ceiling for provider-reported session lifetimes (ten years).
const MAX_SESSION_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Per-provider credential resolution and session caching.
pub struct AuthenticationHandler<T: HttpTransport> {
    transport: Arc<T>,
    configs: std::sync::Mutex<HashMap<String, ProviderAuthConfig>>,
    sessions: std::sync::Mutex<HashMap<String, SessionSlot>>,
}

impl<T: HttpTransport> AuthenticationHandler<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            configs: std::sync::Mutex::new(HashMap::new()),
            sessions: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Associate default credentials, static headers, and a base URL with
    /// a provider name for later implicit use.
    pub fn register_provider_config(&self, provider: impl Into<String>, config: ProviderAuthConfig) {
        self.configs.lock().unwrap().insert(provider.into(), config);
    }

    /// Whether any credential is registered for a provider.
    pub fn has_credentials(&self, provider: &str) -> bool {
        self.configs
            .lock()
            .unwrap()
            .get(provider)
            .map(|c| !c.credentials.is_empty())
            .unwrap_or(false)
    }

    /// Base URL registered for a provider, if any.
    pub fn base_url(&self, provider: &str) -> Option<String> {
        self.configs
            .lock()
            .unwrap()
            .get(provider)
            .and_then(|c| c.base_url.clone())
    }

    /// Authenticate against a provider, returning resolved headers.
    ///
    /// A valid cached session is returned without network I/O. An expired
    /// OAuth session with a refresh token is refreshed in place before
    /// falling back to full re-authentication; refresh failures are
    /// logged, never surfaced. The explicit `credential` wins over the
    /// first registered credential for the provider.
    pub async fn authenticate(
        &self,
        provider: &str,
        credential: Option<Credential>,
        cancel: &CancellationToken,
    ) -> BridgeResult<AuthenticationResult> {
        let slot = self.session_slot(provider);
        let mut guard = slot.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.is_valid() {
                return Ok(session.to_result());
            }
            if let Some(refreshed) = self.try_refresh(provider, session, cancel).await {
                let result = refreshed.to_result();
                *guard = Some(refreshed);
                return Ok(result);
            }
        }

        let credential = match credential.or_else(|| self.default_credential(provider)) {
            Some(c) => c,
            None => {
                return Err(AuthenticationError::MissingCredential {
                    provider: provider.to_string(),
                }
                .into())
            }
        };

        let session = self.run_strategy(provider, credential, cancel).await?;
        let result = session.to_result();
        *guard = Some(session);
        debug!(provider, "authenticated");
        Ok(result)
    }

    /// Delete the cached session for a provider. Idempotent.
    pub async fn logout(&self, provider: &str) {
        let slot = self.session_slot(provider);
        let mut guard = slot.lock().await;
        if guard.take().is_some() {
            debug!(provider, "session cleared");
        }
    }

    fn session_slot(&self, provider: &str) -> SessionSlot {
        self.sessions
            .lock()
            .unwrap()
            .entry(provider.to_string())
            .or_default()
            .clone()
    }

    fn default_credential(&self, provider: &str) -> Option<Credential> {
        self.configs
            .lock()
            .unwrap()
            .get(provider)
            .and_then(|c| c.credentials.first().cloned())
    }

    fn static_headers(&self, provider: &str) -> HashMap<String, String> {
        self.configs
            .lock()
            .unwrap()
            .get(provider)
            .map(|c| c.static_headers.clone())
            .unwrap_or_default()
    }

    /// Variant-specific authentication strategy.
    async fn run_strategy(
        &self,
        provider: &str,
        credential: Credential,
        cancel: &CancellationToken,
    ) -> BridgeResult<SessionState> {
        match &credential {
            Credential::Token { token, header } => {
                let token = expose(token).to_string();
                Ok(self.build_session(provider, token, None, None, "Bearer", header, credential.clone()))
            }
            Credential::Password {
                username,
                password,
                login_url,
                token_extractor,
                header,
            } => {
                let body = serde_json::json!({
                    "username": username,
                    "password": expose(password),
                });
                let response = self
                    .post(provider, login_url, body.to_string(), "application/json", cancel)
                    .await?;
                let json = parse_json(provider, &response)?;

                let token = match token_extractor {
                    Some(extract) => extract(&json),
                    None => json.get("token").and_then(|v| v.as_str()).map(String::from),
                };
                let token = token.ok_or_else(|| AuthenticationError::MissingToken {
                    provider: provider.to_string(),
                })?;

                Ok(self.build_session(provider, token, None, None, "Bearer", header, credential.clone()))
            }
            Credential::OAuth {
                client_id,
                client_secret,
                token_url,
                grant_type,
                scope,
                username,
                password,
                header,
                ..
            } => {
                let mut params: Vec<(&str, String)> = vec![
                    ("grant_type", grant_type.as_str().to_string()),
                    ("client_id", client_id.clone()),
                    ("client_secret", expose(client_secret).to_string()),
                ];
                if *grant_type == OAuthGrantType::Password {
                    if let (Some(user), Some(pass)) = (username, password) {
                        params.push(("username", user.clone()));
                        params.push(("password", expose(pass).to_string()));
                    }
                }
                if let Some(scope) = scope {
                    params.push(("scope", scope.clone()));
                }

                let response = self
                    .post(
                        provider,
                        token_url,
                        encode_form(&params),
                        "application/x-www-form-urlencoded",
                        cancel,
                    )
                    .await?;
                let json = parse_json(provider, &response)?;

                let token = json
                    .get("access_token")
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .ok_or_else(|| AuthenticationError::MissingToken {
                        provider: provider.to_string(),
                    })?;
                let refresh_token = json
                    .get("refresh_token")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                let token_type = json
                    .get("token_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Bearer")
                    .to_string();
                let expires_in = json.get("expires_in").and_then(|v| v.as_u64());

                Ok(self.build_session(
                    provider,
                    token,
                    refresh_token,
                    expires_in,
                    &token_type,
                    header,
                    credential.clone(),
                ))
            }
        }
    }

    /// Refresh-token exchange for an expired OAuth session. Best effort:
    /// any failure logs and returns `None`, letting the caller fall back
    /// to full re-authentication.
    async fn try_refresh(
        &self,
        provider: &str,
        session: &SessionState,
        cancel: &CancellationToken,
    ) -> Option<SessionState> {
        let (client_id, client_secret, token_url, refresh_grant, header) = match &session.credential
        {
            Credential::OAuth {
                client_id,
                client_secret,
                token_url,
                refresh_grant_type: Some(grant),
                header,
                ..
            } => (client_id, client_secret, token_url, grant, header),
            _ => return None,
        };
        let refresh_token = session.refresh_token.as_ref()?;

        let params: Vec<(&str, String)> = vec![
            ("grant_type", refresh_grant.clone()),
            ("refresh_token", refresh_token.clone()),
            ("client_id", client_id.clone()),
            ("client_secret", expose(client_secret).to_string()),
        ];

        let result = self
            .post(
                provider,
                token_url,
                encode_form(&params),
                "application/x-www-form-urlencoded",
                cancel,
            )
            .await
            .and_then(|response| parse_json(provider, &response));

        let json = match result {
            Ok(json) => json,
            Err(error) => {
                warn!(provider, %error, "token refresh failed, falling back to re-authentication");
                return None;
            }
        };

        let token = match json.get("access_token").and_then(|v| v.as_str()) {
            Some(t) => t.to_string(),
            None => {
                warn!(provider, "token refresh response missing access_token");
                return None;
            }
        };
        // Providers may omit the refresh token on rotation; keep the old one.
        let new_refresh = json
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| Some(refresh_token.clone()));
        let token_type = json
            .get("token_type")
            .and_then(|v| v.as_str())
            .unwrap_or("Bearer")
            .to_string();
        let expires_in = json.get("expires_in").and_then(|v| v.as_u64());

        debug!(provider, "session refreshed");
        Some(self.build_session(
            provider,
            token,
            new_refresh,
            expires_in,
            &token_type,
            header,
            session.credential.clone(),
        ))
    }

    fn build_session(
        &self,
        provider: &str,
        token: String,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        token_type: &str,
        header: &HeaderSpec,
        credential: Credential,
    ) -> SessionState {
        let mut headers = self.static_headers(provider);
        headers.insert(header.name.clone(), header.render(&token));

        // Providers report lifetimes in seconds; clamp so an absurd
        // value cannot overflow the deadline arithmetic.
        let expires_in = expires_in.map(|secs| secs.min(MAX_SESSION_LIFETIME_SECS));

        SessionState {
            token,
            refresh_token,
            token_type: token_type.to_string(),
            headers,
            expires_at: expires_in.map(|secs| Instant::now() + Duration::from_secs(secs)),
            expires_at_utc: expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64)),
            expires_in_secs: expires_in,
            credential,
        }
    }

    async fn post(
        &self,
        provider: &str,
        url: &str,
        body: String,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> BridgeResult<HttpResponse> {
        let mut request = HttpRequest::new(HttpMethod::Post, url);
        request
            .headers
            .insert("content-type".to_string(), content_type.to_string());
        request
            .headers
            .insert("accept".to_string(), "application/json".to_string());
        request.body = Some(body);

        let response = self.transport.send(request, cancel).await.map_err(|e| {
            if e.is_cancelled() {
                e
            } else {
                BridgeError::Authentication(AuthenticationError::Network {
                    provider: provider.to_string(),
                    message: e.to_string(),
                })
            }
        })?;

        if !response.is_success() {
            return Err(AuthenticationError::Rejected {
                provider: provider.to_string(),
                status: response.status,
                details: response.body,
            }
            .into());
        }

        Ok(response)
    }
}

fn encode_form(params: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn parse_json(provider: &str, response: &HttpResponse) -> BridgeResult<serde_json::Value> {
    serde_json::from_str(&response.body).map_err(|_| {
        AuthenticationError::InvalidCredential {
            provider: provider.to_string(),
            message: "identity provider returned a non-JSON body".to_string(),
        }
        .into()
    })
}
