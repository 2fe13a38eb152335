//! Core data types for sessions, tenants, records, and run outcomes.

pub mod outcome;
pub mod query;
pub mod record;
pub mod session;
pub mod tenant;

pub use outcome::{ExtractionReport, FailureReason, RunOutcome, TenantFailure};
pub use query::{PageCursor, QueryEnvelope, QueryOperation, RemoteError};
pub use record::{
    CandidateEnrichment, CandidateRecord, CompanyRecord, FeedbackEntry, InterviewEvent, JobRecord,
    RecordKey,
};
pub use session::SessionState;
pub use tenant::{TenantDescriptor, TenantId};
