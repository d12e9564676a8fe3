//! Credential Types
//!
//! Tagged credential variants for the three authentication strategies a
//! provider may use. Dispatch is exhaustive per variant, never stringly
//! typed.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Default header carrying the resolved token.
pub const DEFAULT_AUTH_HEADER: &str = "Authorization";

/// Default value prefix for token-type headers. Note the trailing space.
pub const DEFAULT_TOKEN_PREFIX: &str = "Bearer ";

/// Extracts a token from a parsed JSON login response.
///
/// The default extractor reads the top-level `token` field.
pub type TokenExtractor = Arc<dyn Fn(&serde_json::Value) -> Option<String> + Send + Sync>;

/// Where and how the resolved token lands in request headers.
#[derive(Clone, Debug)]
pub struct HeaderSpec {
    /// Target header name.
    pub name: String,
    /// Value prefix. An explicitly empty prefix means the raw token is
    /// used, e.g. for `X-API-KEY` style headers.
    pub prefix: String,
}

impl Default for HeaderSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTH_HEADER.to_string(),
            prefix: DEFAULT_TOKEN_PREFIX.to_string(),
        }
    }
}

impl HeaderSpec {
    /// Header spec with a custom name and no prefix.
    pub fn raw(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
        }
    }

    /// Render the header value for a token.
    pub fn render(&self, token: &str) -> String {
        if self.prefix.is_empty() {
            token.to_string()
        } else {
            format!("{}{}", self.prefix, token)
        }
    }
}

/// OAuth grant used for the initial token request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthGrantType {
    ClientCredentials,
    Password,
}

impl OAuthGrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
        }
    }
}

/// A credential for one provider.
#[derive(Clone)]
pub enum Credential {
    /// Static API token; resolved locally, no network call.
    Token {
        token: SecretString,
        header: HeaderSpec,
    },
    /// Username/password login against a provider-specific endpoint that
    /// returns a session token in its JSON body.
    Password {
        username: String,
        password: SecretString,
        login_url: String,
        /// Pulls the token out of the login response. Defaults to the
        /// top-level `token` field when absent.
        token_extractor: Option<TokenExtractor>,
        header: HeaderSpec,
    },
    /// OAuth2 token endpoint (client-credentials or password grant).
    OAuth {
        client_id: String,
        client_secret: SecretString,
        token_url: String,
        grant_type: OAuthGrantType,
        scope: Option<String>,
        /// Resource-owner credentials for the password grant.
        username: Option<String>,
        password: Option<SecretString>,
        /// Grant type used for refresh-token exchange. When absent,
        /// expired sessions fall straight through to re-authentication.
        refresh_grant_type: Option<String>,
        header: HeaderSpec,
    },
}

impl Credential {
    /// Static token credential with default `Authorization: Bearer` placement.
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token {
            token: SecretString::new(token.into()),
            header: HeaderSpec::default(),
        }
    }

    /// Static token credential with custom header placement.
    pub fn token_with_header(token: impl Into<String>, header: HeaderSpec) -> Self {
        Self::Token {
            token: SecretString::new(token.into()),
            header,
        }
    }

    /// Password credential with the default token extractor.
    pub fn password(
        username: impl Into<String>,
        password: impl Into<String>,
        login_url: impl Into<String>,
    ) -> Self {
        Self::Password {
            username: username.into(),
            password: SecretString::new(password.into()),
            login_url: login_url.into(),
            token_extractor: None,
            header: HeaderSpec::default(),
        }
    }

    /// Client-credentials OAuth credential.
    pub fn oauth_client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self::OAuth {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            token_url: token_url.into(),
            grant_type: OAuthGrantType::ClientCredentials,
            scope: None,
            username: None,
            password: None,
            refresh_grant_type: Some("refresh_token".to_string()),
            header: HeaderSpec::default(),
        }
    }

    /// Header placement for this credential's resolved token.
    pub fn header_spec(&self) -> &HeaderSpec {
        match self {
            Self::Token { header, .. }
            | Self::Password { header, .. }
            | Self::OAuth { header, .. } => header,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { header, .. } => f
                .debug_struct("Credential::Token")
                .field("token", &"[REDACTED]")
                .field("header", header)
                .finish(),
            Self::Password {
                username,
                login_url,
                header,
                ..
            } => f
                .debug_struct("Credential::Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .field("login_url", login_url)
                .field("header", header)
                .finish(),
            Self::OAuth {
                client_id,
                token_url,
                grant_type,
                scope,
                username,
                refresh_grant_type,
                header,
                ..
            } => f
                .debug_struct("Credential::OAuth")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("token_url", token_url)
                .field("grant_type", grant_type)
                .field("scope", scope)
                .field("username", username)
                .field("refresh_grant_type", refresh_grant_type)
                .field("header", header)
                .finish(),
        }
    }
}

/// Expose a secret value for wire use (crate-internal).
pub(crate) fn expose(secret: &SecretString) -> &str {
    secret.expose_secret()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_header_spec() {
        let spec = HeaderSpec::default();
        assert_eq!(spec.name, "Authorization");
        assert_eq!(spec.render("abc"), "Bearer abc");
    }

    #[test]
    fn test_empty_prefix_renders_raw_token() {
        let spec = HeaderSpec::raw("X-API-KEY");
        assert_eq!(spec.name, "X-API-KEY");
        assert_eq!(spec.render("abc"), "abc");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::password("alice", "hunter2", "https://qtest.example/login");
        let rendered = format!("{:?}", cred);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_grant_type_as_str() {
        assert_eq!(OAuthGrantType::ClientCredentials.as_str(), "client_credentials");
        assert_eq!(OAuthGrantType::Password.as_str(), "password");
    }
}
