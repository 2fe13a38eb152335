//! Extraction orchestration.
//!
//! - [`orchestrator`] - sequential per-tenant extraction with partial-failure
//!   isolation
//! - [`enrich`] - tenant-grouped per-record detail fetches under a
//!   concurrency cap
//! - [`policy`] - the scheduling-needed predicate as an explicit,
//!   configurable policy

pub mod enrich;
pub mod orchestrator;
pub mod policy;

pub use enrich::{EnrichOptions, EnrichmentPipeline};
pub use orchestrator::{ExtractionOptions, ExtractionOrchestrator};
pub use policy::SchedulingPolicy;
