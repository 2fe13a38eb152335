//! In-memory state of one authenticated identity.

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::types::tenant::TenantId;

/// One authenticated identity's credentials and current tenant binding.
///
/// Holds the opaque credential pairs sent with every request, the short-lived
/// anti-forgery token, and the identifier of the tenant the remote session is
/// currently bound to. Created by an external login or persistence
/// collaborator; mutated only by the credential refresher and the tenant
/// context switcher.
///
/// Invariants:
/// - at most one tenant is bound at any instant
/// - the token is cleared on every tenant-switch attempt (success or
///   failure) and stays empty until explicitly refreshed
#[derive(Debug, Deserialize)]
pub struct SessionState {
    /// Opaque credential pairs, sent as a cookie header on every call.
    /// Insertion order is preserved because some remote stacks are
    /// order-sensitive about their session cookies.
    credentials: IndexMap<String, SecretString>,

    /// Current anti-forgery token, if one has been issued since the last
    /// tenant switch.
    #[serde(default)]
    token: Option<String>,

    /// Tenant the remote session is currently bound to, if known.
    #[serde(default)]
    bound_tenant: Option<TenantId>,
}

impl SessionState {
    /// Build a session from credential pairs produced by the login flow.
    pub fn from_credentials<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            credentials: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), SecretString::from(v.into())))
                .collect(),
            token: None,
            bound_tenant: None,
        }
    }

    /// Whether the session carries any credentials at all.
    pub fn has_credentials(&self) -> bool {
        !self.credentials.is_empty()
    }

    /// Credential pairs for persistence collaborators.
    pub fn credentials(&self) -> &IndexMap<String, SecretString> {
        &self.credentials
    }

    /// Render the credential pairs as a `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        self.credentials
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.expose_secret()))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The cached anti-forgery token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Drop the cached token. Called on every tenant-switch attempt because
    /// the remote authorization context has changed out from under it.
    pub(crate) fn clear_token(&mut self) {
        self.token = None;
    }

    /// Tenant the session is currently bound to, if known.
    pub fn bound_tenant(&self) -> Option<&TenantId> {
        self.bound_tenant.as_ref()
    }

    pub(crate) fn bind_tenant(&mut self, tenant: TenantId) {
        self.bound_tenant = Some(tenant);
    }

    pub(crate) fn unbind_tenant(&mut self) {
        self.bound_tenant = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_preserves_insertion_order() {
        let session = SessionState::from_credentials([
            ("_app_session", "abc123"),
            ("csrf_seed", "xyz"),
        ]);
        assert_eq!(session.cookie_header(), "_app_session=abc123; csrf_seed=xyz");
    }

    #[test]
    fn token_lifecycle() {
        let mut session = SessionState::from_credentials([("sid", "1")]);
        assert!(session.token().is_none());

        session.set_token("tok-1".into());
        assert_eq!(session.token(), Some("tok-1"));

        session.clear_token();
        assert!(session.token().is_none());
    }

    #[test]
    fn empty_session_has_no_credentials() {
        let session = SessionState::from_credentials(Vec::<(String, String)>::new());
        assert!(!session.has_credentials());
    }
}
