//! Query catalog seam.

use crate::types::query::QueryOperation;

/// Source of named query operations.
///
/// Catalogs are consulted once per run, when the orchestrator resolves the
/// full operation set; resolution is never re-decided per call.
pub trait QueryCatalog: Send + Sync {
    /// Resolve an operation by name. `None` means this catalog does not
    /// know the operation; a fallback catalog may.
    fn resolve(&self, name: &str) -> Option<QueryOperation>;
}
