//! Tenant discovery.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::catalogs::ResolvedOperations;
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::traits::transport::Transport;
use crate::types::session::SessionState;
use crate::types::tenant::TenantDescriptor;

#[derive(Debug, Deserialize)]
struct MembershipsData {
    viewer: Option<ViewerWire>,
}

#[derive(Debug, Deserialize)]
struct ViewerWire {
    #[serde(default)]
    memberships: Vec<MembershipWire>,
}

#[derive(Debug, Deserialize)]
struct MembershipWire {
    id: String,
    organization: Option<OrganizationWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganizationWire {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentOrganizationData {
    current_organization: Option<OrganizationWire>,
}

/// Discovers the set of tenants the authenticated identity may access.
///
/// Discovery runs once per extraction; descriptors are immutable afterwards.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
    executor: QueryExecutor,
}

impl TenantRegistry {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    /// List accessible tenants.
    ///
    /// A valid token is resolved before the discovery query runs. When the
    /// remote membership list is empty, falls back to a single synthetic
    /// descriptor for whatever tenant the session is implicitly bound to,
    /// so a minimally valid session always yields at least one unit of
    /// work. Memberships without an organization in the response are
    /// skipped; a missing display name is kept as `None`, never treated as
    /// an error.
    pub async fn discover<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        ops: &ResolvedOperations,
    ) -> Result<Vec<TenantDescriptor>> {
        let data = self
            .executor
            .run(transport, session, &ops.memberships, json!({}))
            .await?;
        let parsed: MembershipsData = serde_json::from_value(data)?;

        let mut tenants = Vec::new();
        for membership in parsed.viewer.map(|v| v.memberships).unwrap_or_default() {
            match membership.organization {
                Some(org) => {
                    tenants.push(TenantDescriptor::new(org.id, org.name, membership.id));
                }
                None => {
                    warn!(membership = %membership.id, "membership without organization, skipping");
                }
            }
        }

        if tenants.is_empty() {
            info!("no memberships listed; probing the implicitly bound tenant");
            return self.discover_implicit(transport, session, ops).await;
        }

        info!(count = tenants.len(), "discovered tenants");
        Ok(tenants)
    }

    /// Derive a synthetic descriptor from the verification query.
    async fn discover_implicit<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        ops: &ResolvedOperations,
    ) -> Result<Vec<TenantDescriptor>> {
        let data = self
            .executor
            .run(transport, session, &ops.current_organization, json!({}))
            .await?;
        let parsed: CurrentOrganizationData = serde_json::from_value(data)?;

        match parsed.current_organization {
            Some(org) => {
                info!(tenant = %org.id, "using implicitly bound tenant");
                Ok(vec![TenantDescriptor::synthetic(org.id, org.name)])
            }
            None => {
                warn!("session is bound to no tenant and lists no memberships");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialRefresher, RetryPolicy};
    use crate::catalogs::CatalogChain;
    use crate::testing::MockTransport;

    fn registry() -> TenantRegistry {
        TenantRegistry::new(QueryExecutor::new(
            CredentialRefresher::default(),
            RetryPolicy::no_retries(),
        ))
    }

    fn resolved() -> ResolvedOperations {
        ResolvedOperations::resolve(&CatalogChain::builtin_only()).unwrap()
    }

    fn session() -> SessionState {
        SessionState::from_credentials([("sid", "s3cret")])
    }

    #[tokio::test]
    async fn discovers_all_memberships() {
        let transport = MockTransport::new()
            .with_membership("mem_1", "org_1", Some("Acme"))
            .with_membership("mem_2", "org_2", None);
        let mut session = session();

        let tenants = registry()
            .discover(&transport, &mut session, &resolved())
            .await
            .unwrap();

        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].display_name(), "Acme");
        // Missing name falls back to the id, not an error.
        assert_eq!(tenants[1].display_name(), "org_2");
        assert_eq!(tenants[1].membership_id.as_deref(), Some("mem_2"));
    }

    #[tokio::test]
    async fn discovery_resolves_a_token_first() {
        let transport = MockTransport::new().with_membership("mem_1", "org_1", None);
        let mut session = session();

        registry()
            .discover(&transport, &mut session, &resolved())
            .await
            .unwrap();
        assert_eq!(transport.token_calls(), 1);
        assert!(session.token().is_some());
    }

    #[tokio::test]
    async fn empty_membership_list_falls_back_to_implicit_tenant() {
        let transport = MockTransport::new()
            .with_bound_tenant("org_9")
            .with_query_response(
                "CurrentOrganization",
                json!({"currentOrganization": {"id": "org_9", "name": "Fallback Org"}}),
            );
        let mut session = session();

        let tenants = registry()
            .discover(&transport, &mut session, &resolved())
            .await
            .unwrap();

        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].id.as_str(), "org_9");
        assert!(tenants[0].membership_id.is_none());
    }

    #[tokio::test]
    async fn no_memberships_and_no_binding_yields_nothing() {
        let transport = MockTransport::new();
        let mut session = session();

        let tenants = registry()
            .discover(&transport, &mut session, &resolved())
            .await
            .unwrap();
        assert!(tenants.is_empty());
    }
}
