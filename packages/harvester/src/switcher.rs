//! Tenant context switching.
//!
//! The remote session binds exactly one tenant at a time, and the binding
//! is a shared mutable resource on the remote side. Rather than a hidden
//! "current org" field scattered across call sites, the switch is an
//! explicit state machine:
//!
//! ```text
//! Unbound ── switch ──▶ Switching(t) ──▶ Verifying(t) ──▶ Bound(t)
//!                            │                 │
//!                            ▼                 ▼
//!                  SwitchFailed(t,       SwitchFailed(t,
//!                  SwitchRequestFailed)  VerificationMismatch)
//! ```
//!
//! There is no `Bound → Bound` edge: every tenant change passes the full
//! switch-and-verify sequence. Skipping verification risks silently reading
//! the wrong tenant's data, which is strictly worse than an explicit
//! failure. The anti-forgery token is cleared on every switch attempt,
//! success or failure, because the remote authorization context changed
//! out from under it either way.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::auth::CredentialRefresher;
use crate::catalogs::ResolvedOperations;
use crate::error::{HarvestError, Result, SwitchFailureReason, TransportError};
use crate::executor::QueryExecutor;
use crate::traits::transport::Transport;
use crate::types::session::SessionState;
use crate::types::tenant::{TenantDescriptor, TenantId};

/// Where the switcher currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchState {
    Unbound,
    Switching(TenantId),
    Verifying(TenantId),
    Bound(TenantId),
    SwitchFailed {
        target: TenantId,
        reason: SwitchFailureReason,
    },
}

impl std::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchState::Unbound => write!(f, "Unbound"),
            SwitchState::Switching(t) => write!(f, "Switching({t})"),
            SwitchState::Verifying(t) => write!(f, "Verifying({t})"),
            SwitchState::Bound(t) => write!(f, "Bound({t})"),
            SwitchState::SwitchFailed { target, reason } => {
                write!(f, "SwitchFailed({target}, {reason})")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationData {
    current_organization: Option<VerifiedOrganization>,
}

#[derive(Debug, Deserialize)]
struct VerifiedOrganization {
    id: String,
}

/// Performs and verifies the rebinding of a session to a tenant.
#[derive(Debug)]
pub struct TenantContextSwitcher {
    refresher: CredentialRefresher,
    executor: QueryExecutor,
    state: SwitchState,
}

impl TenantContextSwitcher {
    pub fn new(refresher: CredentialRefresher, executor: QueryExecutor) -> Self {
        Self {
            refresher,
            executor,
            state: SwitchState::Unbound,
        }
    }

    pub fn state(&self) -> &SwitchState {
        &self.state
    }

    /// Tenant the switcher has verified as bound, if any.
    pub fn bound_tenant(&self) -> Option<&TenantId> {
        match &self.state {
            SwitchState::Bound(t) => Some(t),
            _ => None,
        }
    }

    /// Return to `Unbound`. The orchestrator calls this after recording a
    /// failure so the machine is never left half-bound between tenants.
    pub fn reset(&mut self) {
        self.state = SwitchState::Unbound;
    }

    /// Bind the session to `tenant`, passing the full switch-and-verify
    /// sequence.
    ///
    /// Tenant-local failures come back as
    /// [`HarvestError::TenantSwitchFailed`] with the machine in
    /// `SwitchFailed`; run-fatal errors (dead session, refresh exhaustion)
    /// propagate unchanged with the machine reset to `Unbound`.
    pub async fn switch<T: Transport>(
        &mut self,
        transport: &T,
        session: &mut SessionState,
        tenant: &TenantDescriptor,
        ops: &ResolvedOperations,
    ) -> Result<()> {
        let target = tenant.id.clone();
        session.unbind_tenant();
        self.state = SwitchState::Switching(target.clone());
        debug!(tenant = %target, "switching tenant context");

        if let Some(membership_id) = &tenant.membership_id {
            if let Err(err) = self.refresher.ensure_token(transport, session, false).await {
                self.state = SwitchState::Unbound;
                return Err(err);
            }
            let outcome = transport.switch_tenant(session, membership_id).await;
            // The remote context may have changed even on failure, so the
            // token dies with the attempt either way.
            session.clear_token();
            match outcome {
                Ok(()) => {}
                Err(TransportError::Unauthorized) => {
                    self.state = SwitchState::Unbound;
                    return Err(HarvestError::SessionInvalid);
                }
                Err(err) => {
                    warn!(tenant = %target, error = %err, "switch request failed");
                    return self.fail(target, SwitchFailureReason::SwitchRequestFailed);
                }
            }
        } else {
            // Synthetic descriptor: the tenant is already implicitly
            // bound, so there is no switch call to make. Still verify.
            debug!(tenant = %target, "no membership id; verifying implicit binding");
            session.clear_token();
        }

        self.state = SwitchState::Verifying(target.clone());

        // The old token is categorically unusable for the new tenant.
        match self.refresher.ensure_token(transport, session, true).await {
            Ok(_) => {}
            Err(err) => {
                self.state = SwitchState::Unbound;
                return Err(err);
            }
        }

        let reported = match self.verify(transport, session, ops).await {
            Ok(reported) => reported,
            Err(err) if err.is_run_fatal() => {
                self.state = SwitchState::Unbound;
                return Err(err);
            }
            Err(err) => {
                warn!(tenant = %target, error = %err, "verification query failed");
                return self.fail(target, SwitchFailureReason::VerificationMismatch);
            }
        };

        match reported {
            Some(id) if id == target => {
                info!(tenant = %target, "tenant context bound and verified");
                self.state = SwitchState::Bound(target.clone());
                session.bind_tenant(target);
                Ok(())
            }
            reported => {
                warn!(
                    tenant = %target,
                    reported = %reported.map(|t| t.to_string()).unwrap_or_else(|| "none".into()),
                    "verification reported a different tenant"
                );
                self.fail(target, SwitchFailureReason::VerificationMismatch)
            }
        }
    }

    async fn verify<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        ops: &ResolvedOperations,
    ) -> Result<Option<TenantId>> {
        let data = self
            .executor
            .run(transport, session, &ops.current_organization, json!({}))
            .await?;
        let parsed: VerificationData = serde_json::from_value(data)?;
        Ok(parsed.current_organization.map(|org| TenantId::new(org.id)))
    }

    fn fail(&mut self, target: TenantId, reason: SwitchFailureReason) -> Result<()> {
        self.state = SwitchState::SwitchFailed {
            target: target.clone(),
            reason,
        };
        Err(HarvestError::TenantSwitchFailed {
            tenant: target.to_string(),
            reason,
        })
    }
}
