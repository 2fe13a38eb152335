//! Embedded default query documents.
//!
//! These mirror the application's own internal operations closely enough to
//! work against a stock deployment; a recorded catalog captured from the
//! live application takes precedence when available.

use std::collections::HashMap;

use crate::traits::catalog::QueryCatalog;
use crate::types::query::QueryOperation;

const MEMBERSHIPS_DOC: &str = "\
query Memberships {
  viewer {
    memberships {
      id
      organization { id name }
    }
  }
}";

const CURRENT_ORGANIZATION_DOC: &str = "\
query CurrentOrganization {
  currentOrganization { id name }
}";

const JOBS_DOC: &str = "\
query Jobs {
  jobs {
    id
    title
    status
    location
    createdAt
  }
}";

const ACTIVE_CANDIDATES_DOC: &str = "\
query ActiveCandidates($after: String, $first: Int) {
  activeCandidates(after: $after, first: $first) {
    items {
      id
      name
      jobId
      stage
      stageType
      status
      creditedTo
      createdAt
      lastActivityAt
      stageEnteredAt
    }
    pageInfo { endCursor hasNextPage }
  }
}";

const CANDIDATE_DETAIL_DOC: &str = "\
query CandidateDetail($id: ID!) {
  candidate(id: $id) {
    id
    interviewEvents { remoteId title scheduledAt interviewer }
    feedback { author submittedAt summary }
  }
}";

/// The embedded fallback catalog.
pub struct BuiltinCatalog {
    operations: HashMap<&'static str, QueryOperation>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        let mut operations = HashMap::new();
        operations.insert(
            super::ops::MEMBERSHIPS,
            QueryOperation::new(super::ops::MEMBERSHIPS, MEMBERSHIPS_DOC),
        );
        operations.insert(
            super::ops::CURRENT_ORGANIZATION,
            QueryOperation::new(super::ops::CURRENT_ORGANIZATION, CURRENT_ORGANIZATION_DOC),
        );
        operations.insert(
            super::ops::JOBS,
            QueryOperation::new(super::ops::JOBS, JOBS_DOC),
        );
        operations.insert(
            super::ops::ACTIVE_CANDIDATES,
            QueryOperation::new(super::ops::ACTIVE_CANDIDATES, ACTIVE_CANDIDATES_DOC)
                .with_variables(["after", "first"]),
        );
        operations.insert(
            super::ops::CANDIDATE_DETAIL,
            QueryOperation::new(super::ops::CANDIDATE_DETAIL, CANDIDATE_DETAIL_DOC)
                .with_variables(["id"]),
        );
        Self { operations }
    }
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCatalog for BuiltinCatalog {
    fn resolve(&self, name: &str) -> Option<QueryOperation> {
        self.operations.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_required_operations_are_present() {
        let catalog = BuiltinCatalog::new();
        for name in [
            super::super::ops::MEMBERSHIPS,
            super::super::ops::CURRENT_ORGANIZATION,
            super::super::ops::JOBS,
            super::super::ops::ACTIVE_CANDIDATES,
            super::super::ops::CANDIDATE_DETAIL,
        ] {
            let op = catalog.resolve(name).unwrap();
            assert_eq!(op.name, name);
            assert!(!op.document.is_empty());
        }
    }

    #[test]
    fn unknown_operation_is_none() {
        assert!(BuiltinCatalog::new().resolve("DeleteEverything").is_none());
    }
}
