//! Per-tenant failure records and the final report of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HarvestError, SwitchFailureReason};
use crate::types::record::{CandidateRecord, CompanyRecord, JobRecord};
use crate::types::tenant::TenantId;

/// Why a tenant produced no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    TenantSwitchFailed,
    VerificationMismatch,
    QueryFatal,
    QueryTransient,
    PaginationInconsistency,
    SessionInvalid,
    CredentialRefreshFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::TenantSwitchFailed => "TenantSwitchFailed",
            FailureReason::VerificationMismatch => "VerificationMismatch",
            FailureReason::QueryFatal => "QueryFatalError",
            FailureReason::QueryTransient => "QueryTransientError",
            FailureReason::PaginationInconsistency => "PaginationInconsistency",
            FailureReason::SessionInvalid => "SessionInvalid",
            FailureReason::CredentialRefreshFailed => "CredentialRefreshFailed",
        };
        f.write_str(s)
    }
}

impl FailureReason {
    /// Map an orchestration error to the reason recorded against a tenant.
    ///
    /// Returns `None` for errors that are not tenant failures (cancellation,
    /// parse errors surfaced before any tenant work).
    pub fn from_error(err: &HarvestError) -> Option<Self> {
        match err {
            HarvestError::TenantSwitchFailed { reason, .. } => Some(match reason {
                SwitchFailureReason::SwitchRequestFailed => FailureReason::TenantSwitchFailed,
                SwitchFailureReason::VerificationMismatch => FailureReason::VerificationMismatch,
            }),
            HarvestError::QueryFatal { .. } => Some(FailureReason::QueryFatal),
            HarvestError::QueryTransient { .. } => Some(FailureReason::QueryTransient),
            HarvestError::PaginationInconsistency { .. } => {
                Some(FailureReason::PaginationInconsistency)
            }
            HarvestError::SessionInvalid => Some(FailureReason::SessionInvalid),
            HarvestError::CredentialRefreshFailed { .. } => {
                Some(FailureReason::CredentialRefreshFailed)
            }
            // A record set we cannot parse is fatal for that tenant.
            HarvestError::JsonParse(_) => Some(FailureReason::QueryFatal),
            _ => None,
        }
    }
}

/// One tenant that produced no records, with the classified reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFailure {
    pub tenant: TenantId,
    pub reason: FailureReason,
    /// Human-readable detail for the failure report
    pub detail: String,
}

/// How a run ended, taken as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Every tenant extracted successfully
    Complete,
    /// Some tenants extracted, some failed
    Partial,
    /// Every attempted tenant failed; distinct from an empty success
    Failed,
    /// The run stopped early (dead session or cancellation); aggregated
    /// records from earlier tenants are still present
    Aborted,
}

/// Union of all successful tenants' records plus the per-tenant failure
/// list. Partial results are never discarded because one tenant failed.
#[derive(Debug, Serialize)]
pub struct ExtractionReport {
    /// Identifier of this run, for log correlation
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub companies: Vec<CompanyRecord>,
    pub jobs: Vec<JobRecord>,
    pub candidates: Vec<CandidateRecord>,

    pub succeeded: Vec<TenantId>,
    pub failures: Vec<TenantFailure>,

    /// True when the run stopped before trying every tenant
    pub aborted: bool,
}

impl ExtractionReport {
    pub(crate) fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            companies: Vec::new(),
            jobs: Vec::new(),
            candidates: Vec::new(),
            succeeded: Vec::new(),
            failures: Vec::new(),
            aborted: false,
        }
    }

    /// Classify the run as a whole.
    pub fn outcome(&self) -> RunOutcome {
        if self.aborted {
            RunOutcome::Aborted
        } else if self.succeeded.is_empty() && !self.failures.is_empty() {
            RunOutcome::Failed
        } else if self.failures.is_empty() {
            RunOutcome::Complete
        } else {
            RunOutcome::Partial
        }
    }

    /// Total records across all entity kinds.
    pub fn record_count(&self) -> usize {
        self.companies.len() + self.jobs.len() + self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_successes_is_failed_not_empty_success() {
        let mut report = ExtractionReport::new();
        report.failures.push(TenantFailure {
            tenant: TenantId::new("org_1"),
            reason: FailureReason::TenantSwitchFailed,
            detail: "switch call failed".into(),
        });
        assert_eq!(report.outcome(), RunOutcome::Failed);
    }

    #[test]
    fn no_tenants_at_all_is_complete() {
        // Degenerate but legal: a filter can exclude everything.
        let report = ExtractionReport::new();
        assert_eq!(report.outcome(), RunOutcome::Complete);
    }

    #[test]
    fn mixed_results_are_partial() {
        let mut report = ExtractionReport::new();
        report.succeeded.push(TenantId::new("org_a"));
        report.failures.push(TenantFailure {
            tenant: TenantId::new("org_b"),
            reason: FailureReason::VerificationMismatch,
            detail: "expected org_b, remote reports org_a".into(),
        });
        assert_eq!(report.outcome(), RunOutcome::Partial);
    }

    #[test]
    fn aborted_wins_over_everything() {
        let mut report = ExtractionReport::new();
        report.succeeded.push(TenantId::new("org_a"));
        report.aborted = true;
        assert_eq!(report.outcome(), RunOutcome::Aborted);
    }
}
