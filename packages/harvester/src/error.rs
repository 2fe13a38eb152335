//! Typed errors for the harvester library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Two layers:
//!
//! - [`TransportError`]: what the remote boundary reports for one call
//! - [`HarvestError`]: the orchestration-level taxonomy, with a hard split
//!   between run-fatal conditions (the shared session is unusable) and
//!   tenant-local conditions (record and move on)

use thiserror::Error;

/// Errors that can occur during an extraction run.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// No credentials at all; the run never starts
    #[error("session has no credentials")]
    SessionMissing,

    /// Authorization was rejected; the session is dead for everyone.
    /// Fatal for the whole run, never retried.
    #[error("session rejected by remote application")]
    SessionInvalid,

    /// Anti-forgery token issuance exhausted its retries
    #[error("credential refresh failed after {attempts} attempts: {source}")]
    CredentialRefreshFailed {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Tenant switch failed; local to that tenant
    #[error("tenant switch to {tenant} failed: {reason}")]
    TenantSwitchFailed { tenant: String, reason: SwitchFailureReason },

    /// Structurally malformed response; aborts the current tenant's queries
    #[error("query '{operation}' returned a malformed response: {detail}")]
    QueryFatal { operation: String, detail: String },

    /// Transient failures exhausted their retry budget
    #[error("query '{operation}' failed after {attempts} attempts: {source}")]
    QueryTransient {
        operation: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// A pagination cursor failed to advance; fatal for that tenant
    #[error("pagination cursor for '{operation}' did not advance at page {page}")]
    PaginationInconsistency { operation: String, page: usize },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A required query operation is missing from every catalog
    #[error("query operation '{0}' not found in any catalog")]
    OperationNotFound(String),
}

impl HarvestError {
    /// Whether this error invalidates the remainder of the run, as opposed
    /// to only the tenant currently being processed.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::SessionMissing
                | HarvestError::SessionInvalid
                | HarvestError::CredentialRefreshFailed { .. }
                | HarvestError::Cancelled
        )
    }
}

/// Why a tenant switch was recorded as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchFailureReason {
    /// The remote switch call itself failed
    SwitchRequestFailed,
    /// The post-switch verification query reported a different tenant
    VerificationMismatch,
}

impl std::fmt::Display for SwitchFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchFailureReason::SwitchRequestFailed => write!(f, "SwitchRequestFailed"),
            SwitchFailureReason::VerificationMismatch => write!(f, "VerificationMismatch"),
        }
    }
}

/// Errors reported by the remote application boundary for a single call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote application rejected the session credentials (401/403)
    #[error("authorization rejected")]
    Unauthorized,

    /// Response did not have the expected structure
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Server-side failure (5xx)
    #[error("server error: HTTP {0}")]
    Server(u16),

    /// Connection-level failure
    #[error("connection error: {0}")]
    Connection(String),
}

impl TransportError {
    /// Transient errors are worth retrying; the rest are terminal for the
    /// call that produced them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout | TransportError::Server(_) | TransportError::Connection(_)
        )
    }
}

/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Server(503).is_transient());
        assert!(TransportError::Connection("reset".into()).is_transient());
        assert!(!TransportError::Unauthorized.is_transient());
        assert!(!TransportError::Malformed("bad".into()).is_transient());
    }

    #[test]
    fn run_fatal_classification() {
        assert!(HarvestError::SessionInvalid.is_run_fatal());
        assert!(HarvestError::SessionMissing.is_run_fatal());
        assert!(!HarvestError::TenantSwitchFailed {
            tenant: "org_1".into(),
            reason: SwitchFailureReason::VerificationMismatch,
        }
        .is_run_fatal());
        assert!(!HarvestError::PaginationInconsistency {
            operation: "ActiveCandidates".into(),
            page: 3,
        }
        .is_run_fatal());
    }
}
