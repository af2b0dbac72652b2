//! Explicit session state
//!
//! A [`Session`] is a value: the server location and one [`TokenPair`].
//! [`Session::refresh`] asks the OAuth token endpoint for a new pair using
//! the refresh-token grant and returns it; the caller decides where the new
//! pair goes.

use crate::error::HttpError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Access and refresh token, plus whatever else the issuer returned
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Other fields (`expiry_date`, `scope`, ...), kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenPair {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            extra: Map::new(),
        }
    }

    /// Combine with a token endpoint answer
    ///
    /// Issuers usually omit the refresh token on refresh; the old one stays.
    #[must_use]
    pub fn merged_with(&self, fresh: TokenPair) -> Self {
        let mut extra = self.extra.clone();
        extra.extend(fresh.extra);
        Self {
            access_token: fresh.access_token,
            refresh_token: fresh.refresh_token.or_else(|| self.refresh_token.clone()),
            extra,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// OAuth client used for the refresh-token grant
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("token_endpoint", &self.token_endpoint)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: token_endpoint.into(),
        }
    }
}

/// Server location and current tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    server_url: String,
    api_path: String,
    tokens: TokenPair,
}

impl Session {
    #[must_use]
    pub fn new(server_url: impl Into<String>, api_path: impl Into<String>, tokens: TokenPair) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_path: api_path.into(),
            tokens,
        }
    }

    #[inline]
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    #[inline]
    #[must_use]
    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    /// Same server with other tokens
    #[must_use]
    pub fn with_tokens(&self, tokens: TokenPair) -> Self {
        Self {
            tokens,
            ..self.clone()
        }
    }

    /// `<server><api path>`
    #[must_use]
    pub fn api_root(&self) -> String {
        let path = self.api_path.trim_matches('/');
        if path.is_empty() {
            self.server_url.clone()
        } else {
            format!("{}/{path}", self.server_url)
        }
    }

    /// Absolute URL of an API path
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.api_root(), path.trim_start_matches('/'))
    }

    /// Obtain a fresh token pair with the refresh-token grant
    pub async fn refresh(&self, http: &reqwest::Client, oauth: &OAuthClient) -> Result<TokenPair, HttpError> {
        let Some(refresh_token) = self.tokens.refresh_token.as_deref() else {
            return Err(HttpError::Refresh(
                "the token file holds no refresh token; run \"rose login\" again".to_string(),
            ));
        };
        debug!(endpoint = %oauth.token_endpoint, "refreshing access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
        ];
        let response = http.post(&oauth.token_endpoint).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(HttpError::Refresh(format!(
                "token endpoint answered {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        let fresh: TokenPair =
            serde_json::from_str(&body).map_err(|e| HttpError::Refresh(format!("unreadable token response: {e}")))?;
        Ok(self.tokens.merged_with(fresh))
    }
}
