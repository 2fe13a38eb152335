//! HTTP implementation of the remote application boundary.
//!
//! Credentials ride as a `Cookie` header on every request; the anti-forgery
//! token, when present on the session, rides as its own header. Queries go
//! through a single POST endpoint carrying the operation name, document, and
//! variables.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::traits::transport::Transport;
use crate::types::query::QueryOperation;
use crate::types::session::SessionState;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_PATH: &str = "/api/anti-forgery/token";
const SWITCH_PATH: &str = "/api/memberships";
const QUERY_PATH: &str = "/api/graphql";

/// Header carrying the anti-forgery token.
const TOKEN_HEADER: &str = "X-Anti-Forgery-Token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// A [`Transport`] speaking HTTP to the remote application.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the session's credentials (and token, when present) to a
    /// request.
    fn authenticated(&self, builder: RequestBuilder, session: &SessionState) -> RequestBuilder {
        let builder = builder
            .timeout(self.timeout)
            .header(reqwest::header::COOKIE, session.cookie_header());
        match session.token() {
            Some(token) => builder.header(TOKEN_HEADER, token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> TransportResult<reqwest::Response> {
        let response = builder.send().await.map_err(classify_request_error)?;
        check_status(response.status())?;
        Ok(response)
    }
}

/// Map a request-level failure onto the transport taxonomy.
fn classify_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Connection(err.to_string())
    }
}

/// Map a non-success HTTP status onto the transport taxonomy.
///
/// 401/403 mean the session itself was rejected; 429 and 5xx are worth
/// retrying; anything else non-success is a malformed exchange.
fn check_status(status: StatusCode) -> TransportResult<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Err(TransportError::Server(status.as_u16())),
        s if s.is_server_error() => Err(TransportError::Server(s.as_u16())),
        s => Err(TransportError::Malformed(format!("unexpected status {s}"))),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn issue_token(&self, session: &SessionState) -> TransportResult<String> {
        debug!("requesting anti-forgery token");
        let request = self.client.post(self.url(TOKEN_PATH));
        let response = self.send(self.authenticated(request, session)).await?;
        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok(parsed.token)
    }

    async fn switch_tenant(
        &self,
        session: &SessionState,
        membership_id: &str,
    ) -> TransportResult<()> {
        debug!(membership_id, "requesting tenant switch");
        let url = format!("{}/{}/activate", self.url(SWITCH_PATH), membership_id);
        let request = self.client.post(url);
        self.send(self.authenticated(request, session)).await?;
        Ok(())
    }

    async fn execute(
        &self,
        session: &SessionState,
        operation: &QueryOperation,
        variables: Value,
    ) -> TransportResult<Value> {
        debug!(operation = %operation.name, "executing query");
        let body = json!({
            "operationName": operation.name,
            "query": operation.document,
            "variables": variables,
        });
        let request = self.client.post(self.url(QUERY_PATH)).json(&body);
        let response = self.send(self.authenticated(request, session)).await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(TransportError::Unauthorized)
        ));
        assert!(matches!(
            check_status(StatusCode::FORBIDDEN),
            Err(TransportError::Unauthorized)
        ));
        assert!(matches!(
            check_status(StatusCode::TOO_MANY_REQUESTS),
            Err(TransportError::Server(429))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY),
            Err(TransportError::Server(502))
        ));
        assert!(matches!(
            check_status(StatusCode::UNPROCESSABLE_ENTITY),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let transport = HttpTransport::new("https://app.example.com/");
        assert_eq!(
            transport.url(QUERY_PATH),
            "https://app.example.com/api/graphql"
        );
    }
}
