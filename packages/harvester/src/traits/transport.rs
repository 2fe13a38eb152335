//! The remote application boundary.
//!
//! Exactly three logical remote operations exist: token issuance, tenant
//! switch, and named query-document execution. Everything else the library
//! does (discovery, verification, listing, detail fetches) is a query
//! document executed through the third operation.
//!
//! The trait is deliberately read-only with respect to remote records: the
//! only state-changing call is the tenant switch, and it changes nothing
//! but the session's authorization context. Exact transport framing
//! (headers, endpoint paths) belongs to implementations, not this contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportResult;
use crate::types::query::QueryOperation;
use crate::types::session::SessionState;

/// One authenticated connection to the remote multi-tenant application.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a fresh anti-forgery token for the session's current
    /// authorization context.
    async fn issue_token(&self, session: &SessionState) -> TransportResult<String>;

    /// Rebind the session's authorization context to another tenant,
    /// addressed by the authenticated user's membership within it.
    async fn switch_tenant(
        &self,
        session: &SessionState,
        membership_id: &str,
    ) -> TransportResult<()>;

    /// Execute one named query operation with the given variables.
    ///
    /// Implementations send the session credentials and the session's
    /// current token with the request; callers are responsible for making
    /// sure a valid token is present on the session first.
    async fn execute(
        &self,
        session: &SessionState,
        operation: &QueryOperation,
        variables: Value,
    ) -> TransportResult<Value>;
}
