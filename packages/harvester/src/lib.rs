//! Multi-Tenant Session & Extraction Orchestration Library
//!
//! Drives read-only data extraction from a multi-tenant web application
//! through a single authenticated browser-style session. The remote session
//! binds exactly one tenant at a time, and its anti-forgery token dies on
//! every tenant switch, so the whole library is organized around managing
//! that one shared, fragile resource correctly:
//!
//! - discover which tenants the identity can access
//! - bind the session to each tenant in turn, verifying the binding took
//! - run paginated queries with retry, classification, and cursor guards
//! - record per-tenant failures without discarding other tenants' results
//! - optionally enrich extracted records with bounded-concurrency detail
//!   fetches
//!
//! # Usage
//!
//! ```rust,ignore
//! use harvester::{
//!     CatalogChain, ExtractionOptions, ExtractionOrchestrator, HttpTransport,
//!     RetryPolicy, SessionState,
//! };
//!
//! let transport = HttpTransport::new("https://app.example.com");
//! let mut session = SessionState::from_credentials([("_app_session", cookie)]);
//!
//! let orchestrator =
//!     ExtractionOrchestrator::new(&CatalogChain::builtin_only(), RetryPolicy::default())?;
//! let report = orchestrator
//!     .run(&transport, &mut session, &ExtractionOptions::default())
//!     .await?;
//!
//! println!("{:?}: {} records", report.outcome(), report.record_count());
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Transport, QueryCatalog, SessionStore)
//! - [`types`] - Session, tenant, query, record, and report types
//! - [`auth`] - Anti-forgery token management with bounded retries
//! - [`registry`] - Tenant discovery
//! - [`switcher`] - The switch-and-verify tenant binding state machine
//! - [`executor`] - Query execution with classification and pagination
//! - [`catalogs`] - Query document catalogs (recorded and builtin)
//! - [`pipeline`] - The extraction orchestrator and enrichment pipeline
//! - [`transports`] - Transport implementations (HTTP, rate-limited wrapper)
//! - [`testing`] - Mock implementations for testing

pub mod auth;
pub mod catalogs;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod registry;
pub mod switcher;
pub mod testing;
pub mod traits;
pub mod transports;
pub mod types;

// Re-export core types at crate root
pub use auth::{CredentialRefresher, RetryPolicy};
pub use catalogs::{ops, BuiltinCatalog, CatalogChain, RecordedCatalog, ResolvedOperations};
pub use error::{HarvestError, Result, SwitchFailureReason, TransportError};
pub use executor::QueryExecutor;
pub use pipeline::{
    enrich::{EnrichOptions, EnrichmentPipeline},
    orchestrator::{ExtractionOptions, ExtractionOrchestrator},
    policy::SchedulingPolicy,
};
pub use registry::TenantRegistry;
pub use switcher::{SwitchState, TenantContextSwitcher};
pub use traits::{
    catalog::QueryCatalog,
    persistence::{SessionStore, StoreError},
    transport::Transport,
};
pub use transports::{HttpTransport, RateLimitedTransport};
pub use types::{
    outcome::{ExtractionReport, FailureReason, RunOutcome, TenantFailure},
    query::{PageCursor, QueryEnvelope, QueryOperation, RemoteError},
    record::{
        CandidateEnrichment, CandidateRecord, CompanyRecord, FeedbackEntry, InterviewEvent,
        JobRecord, RecordKey,
    },
    session::SessionState,
    tenant::{TenantDescriptor, TenantId},
};
