//! Tenant identity types.

use serde::{Deserialize, Serialize};

/// Identifier of one organization within the remote application.
///
/// Remote record identifiers are only unique within a tenant, so this id is
/// half of every record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One tenant the authenticated identity can access.
///
/// Created once per run by the registry and never mutated afterwards. The
/// display name is genuinely optional in the remote discovery response;
/// absence is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDescriptor {
    /// Tenant identifier
    pub id: TenantId,

    /// Human-readable name, when the remote response includes one
    pub name: Option<String>,

    /// Identifier of the authenticated user *within* this tenant; the
    /// remote switch operation keys on this, not on the tenant id. Absent
    /// only for the synthetic descriptor of the implicitly bound tenant,
    /// which needs no switch to reach.
    pub membership_id: Option<String>,
}

impl TenantDescriptor {
    pub fn new(
        id: impl Into<TenantId>,
        name: Option<String>,
        membership_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name,
            membership_id: Some(membership_id.into()),
        }
    }

    /// Descriptor for whatever tenant the session is already implicitly
    /// bound to, used when remote discovery returns nothing.
    pub fn synthetic(id: impl Into<TenantId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            membership_id: None,
        }
    }

    /// Name to show a human, falling back to the id when the remote
    /// response omitted the display name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }

    /// Case-insensitive substring match against the display name.
    pub fn name_matches(&self, needle: &str) -> bool {
        self.display_name()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_id() {
        let named = TenantDescriptor::new("org_1", Some("Acme Robotics".into()), "mem_1");
        assert_eq!(named.display_name(), "Acme Robotics");

        let anonymous = TenantDescriptor::new("org_2", None, "mem_2");
        assert_eq!(anonymous.display_name(), "org_2");
    }

    #[test]
    fn name_filter_is_case_insensitive() {
        let tenant = TenantDescriptor::new("org_1", Some("Acme Robotics".into()), "mem_1");
        assert!(tenant.name_matches("acme"));
        assert!(tenant.name_matches("ROBOT"));
        assert!(!tenant.name_matches("globex"));
    }
}
