//! Rate-limited transport wrapper.
//!
//! Wraps any [`Transport`] with request pacing using the governor crate, so
//! the single shared session never hammers the remote application no matter
//! how aggressive the orchestration above it gets.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde_json::Value;

use crate::error::TransportResult;
use crate::traits::transport::Transport;
use crate::types::query::QueryOperation;
use crate::types::session::SessionState;

const DEFAULT_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(5u32);

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A transport wrapper that enforces a request rate across every call kind.
pub struct RateLimitedTransport<T: Transport> {
    inner: T,
    limiter: Arc<DirectRateLimiter>,
}

impl<T: Transport> RateLimitedTransport<T> {
    /// Wrap `transport` at the default sustained rate.
    pub fn new(transport: T) -> Self {
        Self::with_quota(transport, Quota::per_second(DEFAULT_REQUESTS_PER_SECOND))
    }

    /// Wrap `transport` at `requests_per_second` sustained.
    pub fn per_second(transport: T, requests_per_second: NonZeroU32) -> Self {
        Self::with_quota(transport, Quota::per_second(requests_per_second))
    }

    /// Wrap `transport` with a custom quota (for burst configurations).
    pub fn with_quota(transport: T, quota: Quota) -> Self {
        Self {
            inner: transport,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl<T: Transport> Transport for RateLimitedTransport<T> {
    async fn issue_token(&self, session: &SessionState) -> TransportResult<String> {
        self.wait_for_permit().await;
        self.inner.issue_token(session).await
    }

    async fn switch_tenant(
        &self,
        session: &SessionState,
        membership_id: &str,
    ) -> TransportResult<()> {
        self.wait_for_permit().await;
        self.inner.switch_tenant(session, membership_id).await
    }

    async fn execute(
        &self,
        session: &SessionState,
        operation: &QueryOperation,
        variables: Value,
    ) -> TransportResult<Value> {
        self.wait_for_permit().await;
        self.inner.execute(session, operation, variables).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn calls_pass_through_to_the_inner_transport() {
        let inner = MockTransport::new()
            .with_membership("mem_1", "org_1", Some("Acme"))
            .without_token_validation();
        let limited = RateLimitedTransport::with_quota(
            inner,
            Quota::per_second(nonzero!(1000u32)),
        );
        let session = SessionState::from_credentials([("sid", "1")]);

        let token = limited.issue_token(&session).await.unwrap();
        assert!(token.starts_with("tok-"));

        limited.switch_tenant(&session, "mem_1").await.unwrap();

        let op = QueryOperation::new("Jobs", "query Jobs { jobs }");
        let response = limited.execute(&session, &op, json!({})).await.unwrap();
        assert!(response.get("data").is_some());
    }

    #[tokio::test]
    async fn inner_errors_surface_unchanged() {
        let inner = MockTransport::new()
            .without_token_validation()
            .fail_query_with("Jobs", || crate::error::TransportError::Server(503));
        let limited = RateLimitedTransport::new(inner);
        let session = SessionState::from_credentials([("sid", "1")]);

        let op = QueryOperation::new("Jobs", "query Jobs { jobs }");
        let err = limited.execute(&session, &op, json!({})).await.unwrap_err();
        assert!(matches!(err, crate::error::TransportError::Server(503)));
    }
}
