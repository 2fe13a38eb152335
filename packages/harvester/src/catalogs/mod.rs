//! Query catalog implementations.
//!
//! Two sources exist: operations captured from the live application
//! ([`RecordedCatalog`], primary) and the embedded defaults
//! ([`BuiltinCatalog`], fallback). [`CatalogChain`] composes them, and
//! [`ResolvedOperations`] pins the full operation set once per run so the
//! primary-vs-fallback decision is never re-made per call.

mod builtin;
mod recorded;

pub use builtin::BuiltinCatalog;
pub use recorded::RecordedCatalog;

use crate::error::{HarvestError, Result};
use crate::traits::catalog::QueryCatalog;
use crate::types::query::QueryOperation;

/// Operation names the orchestrator depends on.
pub mod ops {
    /// Lists the authenticated identity's memberships across tenants
    pub const MEMBERSHIPS: &str = "Memberships";
    /// Reports which tenant the session is currently bound to
    pub const CURRENT_ORGANIZATION: &str = "CurrentOrganization";
    /// Lists a tenant's job postings
    pub const JOBS: &str = "Jobs";
    /// Paginated listing of a tenant's active candidates
    pub const ACTIVE_CANDIDATES: &str = "ActiveCandidates";
    /// Detail view for one candidate (interview events, feedback)
    pub const CANDIDATE_DETAIL: &str = "CandidateDetail";
}

/// Ordered chain of catalogs; the first catalog that knows an operation
/// wins.
pub struct CatalogChain {
    sources: Vec<Box<dyn QueryCatalog>>,
}

impl CatalogChain {
    /// Chain with only the builtin defaults.
    pub fn builtin_only() -> Self {
        Self {
            sources: vec![Box::new(BuiltinCatalog::new())],
        }
    }

    /// Chain with a primary source in front of the builtin defaults.
    pub fn with_primary(primary: impl QueryCatalog + 'static) -> Self {
        Self {
            sources: vec![Box::new(primary), Box::new(BuiltinCatalog::new())],
        }
    }
}

impl QueryCatalog for CatalogChain {
    fn resolve(&self, name: &str) -> Option<QueryOperation> {
        self.sources.iter().find_map(|s| s.resolve(name))
    }
}

/// The full operation set an extraction run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct ResolvedOperations {
    pub memberships: QueryOperation,
    pub current_organization: QueryOperation,
    pub jobs: QueryOperation,
    pub active_candidates: QueryOperation,
    pub candidate_detail: QueryOperation,
}

impl ResolvedOperations {
    /// Resolve every required operation, failing fast on the first name no
    /// catalog in the chain knows.
    pub fn resolve(catalog: &dyn QueryCatalog) -> Result<Self> {
        let get = |name: &str| {
            catalog
                .resolve(name)
                .ok_or_else(|| HarvestError::OperationNotFound(name.to_string()))
        };
        Ok(Self {
            memberships: get(ops::MEMBERSHIPS)?,
            current_organization: get(ops::CURRENT_ORGANIZATION)?,
            jobs: get(ops::JOBS)?,
            active_candidates: get(ops::ACTIVE_CANDIDATES)?,
            candidate_detail: get(ops::CANDIDATE_DETAIL)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_chain_resolves_everything() {
        let chain = CatalogChain::builtin_only();
        let resolved = ResolvedOperations::resolve(&chain).unwrap();
        assert_eq!(resolved.jobs.name, ops::JOBS);
        assert_eq!(resolved.active_candidates.name, ops::ACTIVE_CANDIDATES);
    }

    #[test]
    fn primary_catalog_shadows_builtin() {
        let captured = serde_json::json!({
            "Jobs": { "document": "query Jobs { recorded }" }
        });
        let recorded = RecordedCatalog::from_json(&captured).unwrap();
        let chain = CatalogChain::with_primary(recorded);

        let resolved = ResolvedOperations::resolve(&chain).unwrap();
        assert_eq!(resolved.jobs.document, "query Jobs { recorded }");
        // Everything the capture lacks still comes from the builtins.
        assert!(resolved.candidate_detail.document.contains("interviewEvents"));
    }
}
