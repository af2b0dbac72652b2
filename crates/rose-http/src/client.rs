//! reqwest transport

use crate::error::HttpError;
use crate::session::{OAuthClient, Session};
use crate::store::TokenStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use rose_record::{interpret_response, RawResponse, RemoteError, ResponseBody};
use rose_remote::{ApiRequest, Method, Payload, Transport};
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout; archive generation on the server can take a while
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// [`Transport`] over HTTPS with bearer tokens
///
/// A request answered with 401, or with a 500 that is not a missing-record
/// answer, is retried exactly once after refreshing the tokens. Refreshed
/// tokens replace the session and, with a [`TokenStore`], the token file.
pub struct HttpTransport {
    http: reqwest::Client,
    session: Mutex<Session>,
    oauth: OAuthClient,
    store: Option<TokenStore>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("server_url", &self.session.lock().server_url())
            .field("oauth", &self.oauth)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create transport with the default timeout
    pub fn new(session: Session, oauth: OAuthClient) -> Result<Self, HttpError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            session: Mutex::new(session),
            oauth,
            store: None,
        })
    }

    /// Persist refreshed tokens to `store`
    #[must_use]
    pub fn with_token_store(mut self, store: TokenStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Snapshot of the current session
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    async fn send(&self, request: &ApiRequest, session: &Session) -> Result<RawResponse, RemoteError> {
        let url = session.url_for(&request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        debug!(method = request.method.as_str(), %url, "sending request");

        let mut builder = self
            .http
            .request(method, &url)
            .bearer_auth(&session.tokens().access_token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.payload {
            Payload::Empty => builder,
            Payload::Json(value) => builder.json(value),
            Payload::Bytes(bytes) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        debug!(status, bytes = body.len(), path = %request.path, "response received");
        Ok(RawResponse::new(status, body.to_vec()))
    }

    async fn refreshed_session(&self, stale: &Session) -> Result<Session, RemoteError> {
        let tokens = stale.refresh(&self.http, &self.oauth).await?;
        let fresh = stale.with_tokens(tokens);
        *self.session.lock() = fresh.clone();
        if let Some(store) = &self.store {
            if let Err(err) = store.save(fresh.tokens()) {
                warn!(error = %err, "could not persist refreshed tokens");
            }
        }
        Ok(fresh)
    }
}

/// Whether a response means the access token was rejected
fn needs_refresh(raw: &RawResponse) -> bool {
    match raw.status {
        401 => true,
        500 => !interpret_response(raw.clone(), rose_record::ResponseMode::Raw).is_err_and(|e| e.is_not_found()),
        _ => false,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, request: ApiRequest) -> Result<ResponseBody, RemoteError> {
        let session = self.session();
        let raw = self.send(&request, &session).await?;
        if !needs_refresh(&raw) {
            return interpret_response(raw, request.mode);
        }

        debug!(status = raw.status, path = %request.path, "request rejected; refreshing tokens and retrying");
        let session = self.refreshed_session(&session).await?;
        let retry = self.send(&request, &session).await?;
        interpret_response(retry, request.mode)
    }

    fn server_url(&self) -> String {
        self.session.lock().server_url().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_decision() {
        assert!(needs_refresh(&RawResponse::new(401, "")));
        assert!(needs_refresh(&RawResponse::new(500, r#"{"error":"jwt expired"}"#)));
        assert!(!needs_refresh(&RawResponse::new(
            500,
            r#"{"error":"no record found with id 42"}"#
        )));
        assert!(!needs_refresh(&RawResponse::new(404, "")));
        assert!(!needs_refresh(&RawResponse::new(200, "[]")));
    }
}
