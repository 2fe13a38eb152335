//! Testing utilities including mock implementations.
//!
//! [`MockTransport`] simulates the remote multi-tenant application closely
//! enough for the orchestration layers to be tested end to end without a
//! network: it tracks which tenant the simulated session is bound to,
//! invalidates tokens across tenant switches the way the real application
//! does, serves scripted query responses, and records every call for
//! assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::catalogs::ops;
use crate::error::{TransportError, TransportResult};
use crate::traits::persistence::{SessionStore, StoreError};
use crate::traits::transport::Transport;
use crate::types::query::QueryOperation;
use crate::types::session::SessionState;

type Failer = Arc<dyn Fn() -> TransportError + Send + Sync>;

/// A planned failure: fail the next `remaining` calls, or every call when
/// unlimited.
struct FailurePlan {
    remaining: Option<usize>,
    failer: Failer,
}

impl FailurePlan {
    /// Consume one failure if the plan still applies.
    fn take(&mut self) -> Option<TransportError> {
        match &mut self.remaining {
            None => Some((self.failer)()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some((self.failer)())
            }
        }
    }
}

/// One scripted response for a query operation.
enum Scripted {
    Data(Value),
    Errors(Vec<Value>),
}

/// Record of a call made to the mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    IssueToken,
    SwitchTenant { membership_id: String },
    Execute { operation: String },
}

#[derive(Default)]
struct Inner {
    /// (membership id, tenant id, display name)
    memberships: RwLock<Vec<(String, String, Option<String>)>>,

    /// Tenant the simulated remote session is currently bound to
    current_tenant: RwLock<Option<String>>,

    /// Last issued token; switches clear it, mirroring the real
    /// application's anti-forgery invalidation
    valid_token: RwLock<Option<String>>,
    token_seq: AtomicUsize,
    validate_tokens: AtomicBool,

    token_failure: Mutex<Option<FailurePlan>>,
    switch_failures: Mutex<HashMap<String, FailurePlan>>,

    /// Switches that "succeed" but bind a different tenant than requested
    misbound_switches: RwLock<HashMap<String, String>>,

    /// Scripted responses keyed by (tenant scope, operation); `None` scope
    /// applies regardless of the bound tenant
    scripts: Mutex<HashMap<(Option<String>, String), VecDeque<Scripted>>>,
    query_failures: Mutex<HashMap<(Option<String>, String), FailurePlan>>,

    calls: RwLock<Vec<TransportCall>>,
    variables_log: RwLock<HashMap<String, Vec<Value>>>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    execute_delay: RwLock<Duration>,
}

/// A mock remote application boundary for tests.
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let inner = Inner {
            validate_tokens: AtomicBool::new(true),
            ..Default::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    // -- configuration ------------------------------------------------------

    /// Register a membership the identity holds.
    pub fn with_membership(
        self,
        membership_id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: Option<&str>,
    ) -> Self {
        self.inner.memberships.write().unwrap().push((
            membership_id.into(),
            tenant_id.into(),
            name.map(|n| n.to_string()),
        ));
        self
    }

    /// Start with the simulated session already bound to a tenant.
    pub fn with_bound_tenant(self, tenant_id: impl Into<String>) -> Self {
        *self.inner.current_tenant.write().unwrap() = Some(tenant_id.into());
        self
    }

    /// Skip token validation on execute/switch calls.
    pub fn without_token_validation(self) -> Self {
        self.inner.validate_tokens.store(false, Ordering::SeqCst);
        self
    }

    /// Fail every token issuance.
    pub fn fail_token_with(
        self,
        failer: impl Fn() -> TransportError + Send + Sync + 'static,
    ) -> Self {
        *self.inner.token_failure.lock().unwrap() = Some(FailurePlan {
            remaining: None,
            failer: Arc::new(failer),
        });
        self
    }

    /// Fail the next `times` token issuances, then succeed.
    pub fn fail_token_times(
        self,
        times: usize,
        failer: impl Fn() -> TransportError + Send + Sync + 'static,
    ) -> Self {
        *self.inner.token_failure.lock().unwrap() = Some(FailurePlan {
            remaining: Some(times),
            failer: Arc::new(failer),
        });
        self
    }

    /// Fail every switch through the given membership.
    pub fn fail_switch_for(self, membership_id: impl Into<String>) -> Self {
        self.inner.switch_failures.lock().unwrap().insert(
            membership_id.into(),
            FailurePlan {
                remaining: None,
                failer: Arc::new(|| TransportError::Server(500)),
            },
        );
        self
    }

    /// Make a switch "succeed" but bind a different tenant than requested.
    pub fn misbind_switch(
        self,
        membership_id: impl Into<String>,
        actual_tenant: impl Into<String>,
    ) -> Self {
        self.inner
            .misbound_switches
            .write()
            .unwrap()
            .insert(membership_id.into(), actual_tenant.into());
        self
    }

    /// Queue a `data` payload for an operation, regardless of bound tenant.
    pub fn with_query_response(self, operation: impl Into<String>, data: Value) -> Self {
        self.push_script(None, operation.into(), Scripted::Data(data));
        self
    }

    /// Queue a `data` payload served only while the given tenant is bound.
    pub fn with_tenant_query_response(
        self,
        tenant_id: impl Into<String>,
        operation: impl Into<String>,
        data: Value,
    ) -> Self {
        self.push_script(Some(tenant_id.into()), operation.into(), Scripted::Data(data));
        self
    }

    /// Queue an application-level error envelope for an operation.
    pub fn with_query_errors(self, operation: impl Into<String>, errors: Vec<Value>) -> Self {
        self.push_script(None, operation.into(), Scripted::Errors(errors));
        self
    }

    /// Fail every execution of an operation at the transport level.
    pub fn fail_query_with(
        self,
        operation: impl Into<String>,
        failer: impl Fn() -> TransportError + Send + Sync + 'static,
    ) -> Self {
        self.inner.query_failures.lock().unwrap().insert(
            (None, operation.into()),
            FailurePlan {
                remaining: None,
                failer: Arc::new(failer),
            },
        );
        self
    }

    /// Fail the next `times` executions of an operation, then succeed.
    pub fn fail_query_times(
        self,
        operation: impl Into<String>,
        times: usize,
        failer: impl Fn() -> TransportError + Send + Sync + 'static,
    ) -> Self {
        self.inner.query_failures.lock().unwrap().insert(
            (None, operation.into()),
            FailurePlan {
                remaining: Some(times),
                failer: Arc::new(failer),
            },
        );
        self
    }

    /// Fail executions of an operation only while the given tenant is bound.
    pub fn fail_tenant_query_with(
        self,
        tenant_id: impl Into<String>,
        operation: impl Into<String>,
        failer: impl Fn() -> TransportError + Send + Sync + 'static,
    ) -> Self {
        self.inner.query_failures.lock().unwrap().insert(
            (Some(tenant_id.into()), operation.into()),
            FailurePlan {
                remaining: None,
                failer: Arc::new(failer),
            },
        );
        self
    }

    /// Hold every execute call open for `delay`, so concurrency tests can
    /// observe overlap.
    pub fn with_execute_delay(self, delay: Duration) -> Self {
        *self.inner.execute_delay.write().unwrap() = delay;
        self
    }

    fn push_script(&self, tenant: Option<String>, operation: String, script: Scripted) {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .entry((tenant, operation))
            .or_default()
            .push_back(script);
    }

    // -- assertions ---------------------------------------------------------

    /// All calls in arrival order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.inner.calls.read().unwrap().clone()
    }

    pub fn token_calls(&self) -> usize {
        self.inner
            .calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, TransportCall::IssueToken))
            .count()
    }

    pub fn switch_calls(&self) -> usize {
        self.inner
            .calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, TransportCall::SwitchTenant { .. }))
            .count()
    }

    pub fn execute_calls(&self, operation: &str) -> usize {
        self.inner
            .calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, TransportCall::Execute { operation: op } if op == operation))
            .count()
    }

    /// Variables passed to each execution of an operation, in order.
    pub fn execute_variables(&self, operation: &str) -> Vec<Value> {
        self.inner
            .variables_log
            .read()
            .unwrap()
            .get(operation)
            .cloned()
            .unwrap_or_default()
    }

    /// Tenant the simulated remote session is bound to.
    pub fn current_tenant(&self) -> Option<String> {
        self.inner.current_tenant.read().unwrap().clone()
    }

    /// Highest number of execute calls ever observed in flight at once.
    pub fn max_observed_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    // -- behavior -----------------------------------------------------------

    fn record(&self, call: TransportCall) {
        self.inner.calls.write().unwrap().push(call);
    }

    fn check_token(&self, session: &SessionState) -> TransportResult<()> {
        if !self.inner.validate_tokens.load(Ordering::SeqCst) {
            return Ok(());
        }
        let valid = self.inner.valid_token.read().unwrap();
        match (session.token(), valid.as_deref()) {
            (Some(presented), Some(expected)) if presented == expected => Ok(()),
            _ => Err(TransportError::Unauthorized),
        }
    }

    fn default_response(&self, operation: &str) -> Value {
        match operation {
            ops::MEMBERSHIPS => {
                let memberships: Vec<Value> = self
                    .inner
                    .memberships
                    .read()
                    .unwrap()
                    .iter()
                    .map(|(mem, org, name)| {
                        json!({
                            "id": mem,
                            "organization": { "id": org, "name": name }
                        })
                    })
                    .collect();
                json!({ "viewer": { "memberships": memberships } })
            }
            ops::CURRENT_ORGANIZATION => {
                let current = self.inner.current_tenant.read().unwrap().clone();
                match current {
                    Some(org) => {
                        let name = self
                            .inner
                            .memberships
                            .read()
                            .unwrap()
                            .iter()
                            .find(|(_, o, _)| *o == org)
                            .and_then(|(_, _, n)| n.clone());
                        json!({ "currentOrganization": { "id": org, "name": name } })
                    }
                    None => json!({ "currentOrganization": null }),
                }
            }
            ops::JOBS => json!({ "jobs": [] }),
            ops::ACTIVE_CANDIDATES => json!({
                "activeCandidates": {
                    "items": [],
                    "pageInfo": { "endCursor": null, "hasNextPage": false }
                }
            }),
            ops::CANDIDATE_DETAIL => json!({
                "candidate": { "id": null, "interviewEvents": [], "feedback": [] }
            }),
            _ => json!({}),
        }
    }
}

struct InFlightGuard<'a> {
    inner: &'a Inner,
}

impl<'a> InFlightGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn issue_token(&self, _session: &SessionState) -> TransportResult<String> {
        self.record(TransportCall::IssueToken);

        if let Some(plan) = self.inner.token_failure.lock().unwrap().as_mut() {
            if let Some(err) = plan.take() {
                return Err(err);
            }
        }

        let seq = self.inner.token_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("tok-{seq}");
        *self.inner.valid_token.write().unwrap() = Some(token.clone());
        Ok(token)
    }

    async fn switch_tenant(
        &self,
        session: &SessionState,
        membership_id: &str,
    ) -> TransportResult<()> {
        self.record(TransportCall::SwitchTenant {
            membership_id: membership_id.to_string(),
        });
        self.check_token(session)?;

        if let Some(plan) = self
            .inner
            .switch_failures
            .lock()
            .unwrap()
            .get_mut(membership_id)
        {
            if let Some(err) = plan.take() {
                // A failed switch still torpedoes the current token.
                *self.inner.valid_token.write().unwrap() = None;
                return Err(err);
            }
        }

        let target = self
            .inner
            .memberships
            .read()
            .unwrap()
            .iter()
            .find(|(mem, _, _)| mem == membership_id)
            .map(|(_, org, _)| org.clone())
            .ok_or_else(|| TransportError::Server(422))?;

        let bound = self
            .inner
            .misbound_switches
            .read()
            .unwrap()
            .get(membership_id)
            .cloned()
            .unwrap_or(target);

        *self.inner.current_tenant.write().unwrap() = Some(bound);
        // Tokens do not survive a tenant switch.
        *self.inner.valid_token.write().unwrap() = None;
        Ok(())
    }

    async fn execute(
        &self,
        session: &SessionState,
        operation: &QueryOperation,
        variables: Value,
    ) -> TransportResult<Value> {
        self.record(TransportCall::Execute {
            operation: operation.name.clone(),
        });
        self.inner
            .variables_log
            .write()
            .unwrap()
            .entry(operation.name.clone())
            .or_default()
            .push(variables);

        let _guard = InFlightGuard::enter(&self.inner);
        let delay = *self.inner.execute_delay.read().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.check_token(session)?;

        let current = self.inner.current_tenant.read().unwrap().clone();

        {
            let mut failures = self.inner.query_failures.lock().unwrap();
            for scope in [current.clone(), None] {
                if let Some(plan) = failures.get_mut(&(scope, operation.name.clone())) {
                    if let Some(err) = plan.take() {
                        return Err(err);
                    }
                }
            }
        }

        {
            let mut scripts = self.inner.scripts.lock().unwrap();
            for scope in [current.clone(), None] {
                if let Some(queue) = scripts.get_mut(&(scope, operation.name.clone())) {
                    if let Some(script) = queue.pop_front() {
                        return Ok(match script {
                            Scripted::Data(data) => json!({ "data": data }),
                            Scripted::Errors(errors) => {
                                json!({ "data": null, "errors": errors })
                            }
                        });
                    }
                }
            }
        }

        Ok(json!({ "data": self.default_response(&operation.name) }))
    }
}

/// In-memory session store for tests of the persistence seam.
pub struct MemorySessionStore {
    credentials: Vec<(String, String)>,
}

impl MemorySessionStore {
    pub fn new(credentials: Vec<(String, String)>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<SessionState, StoreError> {
        if self.credentials.is_empty() {
            return Err("no persisted session".into());
        }
        Ok(SessionState::from_credentials(self.credentials.clone()))
    }

    async fn save(&self, _session: &SessionState) -> Result<(), StoreError> {
        // Credential values are secrets; this store deliberately writes
        // nothing back.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_die_with_tenant_switches() {
        let transport = MockTransport::new().with_membership("mem_1", "org_1", Some("Acme"));
        let mut session = SessionState::from_credentials([("sid", "1")]);

        let token = transport.issue_token(&session).await.unwrap();
        session.set_token(token);

        transport.switch_tenant(&session, "mem_1").await.unwrap();

        // The old token no longer passes validation.
        let op = QueryOperation::new("Jobs", "query Jobs { jobs }");
        let err = transport
            .execute(&session, &op, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unauthorized));
    }

    #[tokio::test]
    async fn scripted_responses_drain_in_order() {
        let transport = MockTransport::new()
            .without_token_validation()
            .with_query_response("Jobs", json!({"jobs": [1]}))
            .with_query_response("Jobs", json!({"jobs": [2]}));
        let session = SessionState::from_credentials([("sid", "1")]);
        let op = QueryOperation::new("Jobs", "query Jobs { jobs }");

        let first = transport.execute(&session, &op, json!({})).await.unwrap();
        let second = transport.execute(&session, &op, json!({})).await.unwrap();
        assert_eq!(first["data"]["jobs"][0], 1);
        assert_eq!(second["data"]["jobs"][0], 2);
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySessionStore::new(vec![("sid".into(), "s3cret".into())]);
        let session = store.load().await.unwrap();
        assert!(session.has_credentials());
        store.save(&session).await.unwrap();
    }
}
