//! Per-tenant extraction loop.
//!
//! Tenants are processed strictly sequentially: the remote session binds
//! one tenant at a time, so tenant N+1's switch never starts before tenant
//! N's extraction finished (in success or failure) and the switcher
//! returned to `Unbound` or a verified `Bound`. Tenant-local failures are
//! recorded and the loop moves on; a dead session aborts the remainder of
//! the run but never discards what was already aggregated.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{CredentialRefresher, RetryPolicy};
use crate::catalogs::ResolvedOperations;
use crate::error::{HarvestError, Result};
use crate::executor::QueryExecutor;
use crate::registry::TenantRegistry;
use crate::switcher::TenantContextSwitcher;
use crate::traits::catalog::QueryCatalog;
use crate::traits::transport::Transport;
use crate::types::outcome::{ExtractionReport, FailureReason, TenantFailure};
use crate::types::record::{CandidateRecord, CandidateWire, CompanyRecord, JobRecord, JobWire};
use crate::types::session::SessionState;
use crate::types::tenant::TenantDescriptor;

const DEFAULT_TENANT_DELAY_MS: u64 = 250;

#[derive(Debug, Deserialize)]
struct JobsData {
    #[serde(default)]
    jobs: Vec<JobWire>,
}

/// Knobs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Process at most this many tenants
    pub max_tenants: Option<usize>,

    /// Only process tenants whose display name contains this substring
    /// (case-insensitive)
    pub name_filter: Option<String>,

    /// Pause between tenants, to stay polite toward the remote service
    pub tenant_delay: Duration,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_tenants: None,
            name_filter: None,
            tenant_delay: Duration::from_millis(DEFAULT_TENANT_DELAY_MS),
        }
    }
}

impl ExtractionOptions {
    pub fn with_max_tenants(mut self, max: usize) -> Self {
        self.max_tenants = Some(max);
        self
    }

    pub fn with_name_filter(mut self, needle: impl Into<String>) -> Self {
        self.name_filter = Some(needle.into());
        self
    }

    pub fn with_tenant_delay(mut self, delay: Duration) -> Self {
        self.tenant_delay = delay;
        self
    }
}

/// Drives discovery, switching, and extraction across every accessible
/// tenant.
pub struct ExtractionOrchestrator {
    refresher: CredentialRefresher,
    executor: QueryExecutor,
    ops: ResolvedOperations,
}

impl ExtractionOrchestrator {
    /// Build an orchestrator, resolving the full operation set from the
    /// catalog once up front.
    pub fn new(catalog: &dyn QueryCatalog, retry: RetryPolicy) -> Result<Self> {
        let refresher = CredentialRefresher::new(retry.clone());
        let executor = QueryExecutor::new(refresher.clone(), retry);
        let ops = ResolvedOperations::resolve(catalog)?;
        Ok(Self {
            refresher,
            executor,
            ops,
        })
    }

    /// The resolved operation set this run will use.
    pub fn operations(&self) -> &ResolvedOperations {
        &self.ops
    }

    /// A registry wired to this orchestrator's executor.
    pub fn registry(&self) -> TenantRegistry {
        TenantRegistry::new(self.executor.clone())
    }

    /// A switcher wired to this orchestrator's refresher and executor.
    pub fn switcher(&self) -> TenantContextSwitcher {
        TenantContextSwitcher::new(self.refresher.clone(), self.executor.clone())
    }

    /// Discover tenants, then extract from all of them.
    pub async fn run<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        options: &ExtractionOptions,
    ) -> Result<ExtractionReport> {
        let tenants = self.registry().discover(transport, session, &self.ops).await?;
        self.extract(transport, session, &tenants, options).await
    }

    /// Extract from the given tenants.
    pub async fn extract<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        tenants: &[TenantDescriptor],
        options: &ExtractionOptions,
    ) -> Result<ExtractionReport> {
        self.extract_with_cancel(transport, session, tenants, options, CancellationToken::new())
            .await
    }

    /// Extract with cancellation support.
    ///
    /// Cancellation is honored between tenants: the tenant being processed
    /// finishes, no new switch starts, and the report carries everything
    /// aggregated so far with `aborted` set.
    pub async fn extract_with_cancel<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        tenants: &[TenantDescriptor],
        options: &ExtractionOptions,
        cancel: CancellationToken,
    ) -> Result<ExtractionReport> {
        if !session.has_credentials() {
            return Err(HarvestError::SessionMissing);
        }

        let selected = Self::select_tenants(tenants, options);
        info!(
            available = tenants.len(),
            selected = selected.len(),
            "starting extraction run"
        );

        let mut report = ExtractionReport::new();
        let mut switcher =
            TenantContextSwitcher::new(self.refresher.clone(), self.executor.clone());

        for (index, tenant) in selected.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("cancellation requested; stopping before the next tenant");
                report.aborted = true;
                break;
            }
            if index > 0 && !options.tenant_delay.is_zero() {
                tokio::time::sleep(options.tenant_delay).await;
            }

            info!(tenant = %tenant.id, name = tenant.display_name(), "processing tenant");

            if let Err(err) = switcher.switch(transport, session, tenant, &self.ops).await {
                let fatal = err.is_run_fatal();
                Self::record_failure(&mut report, tenant, &err);
                if fatal {
                    warn!(tenant = %tenant.id, error = %err, "run-fatal error during switch; aborting");
                    report.aborted = true;
                    break;
                }
                switcher.reset();
                continue;
            }

            match self.extract_tenant(transport, session, tenant).await {
                Ok((jobs, candidates)) => {
                    info!(
                        tenant = %tenant.id,
                        jobs = jobs.len(),
                        candidates = candidates.len(),
                        "tenant extracted"
                    );
                    report.companies.push(CompanyRecord {
                        tenant: tenant.id.clone(),
                        remote_id: tenant.id.to_string(),
                        name: tenant.display_name().to_string(),
                        extracted_at: Utc::now(),
                    });
                    report.jobs.extend(jobs);
                    report.candidates.extend(candidates);
                    report.succeeded.push(tenant.id.clone());
                }
                Err(err) => {
                    let fatal = err.is_run_fatal();
                    Self::record_failure(&mut report, tenant, &err);
                    if fatal {
                        warn!(tenant = %tenant.id, error = %err, "session no longer usable; aborting run");
                        report.aborted = true;
                        break;
                    }
                    switcher.reset();
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            outcome = ?report.outcome(),
            records = report.record_count(),
            failures = report.failures.len(),
            "extraction run finished"
        );
        Ok(report)
    }

    /// Run the base queries against the currently bound tenant.
    async fn extract_tenant<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        tenant: &TenantDescriptor,
    ) -> Result<(Vec<JobRecord>, Vec<CandidateRecord>)> {
        let data = self
            .executor
            .run(transport, session, &self.ops.jobs, json!({}))
            .await?;
        let jobs_data: JobsData = serde_json::from_value(data)?;
        let jobs: Vec<JobRecord> = jobs_data
            .jobs
            .into_iter()
            .map(|wire| wire.into_record(&tenant.id))
            .collect();

        let items = self
            .executor
            .run_paginated(transport, session, &self.ops.active_candidates, json!({}))
            .await?;
        let now = Utc::now();
        let candidates = items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<CandidateWire>(item)
                    .map(|wire| wire.into_record(&tenant.id, now))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((jobs, candidates))
    }

    fn select_tenants<'a>(
        tenants: &'a [TenantDescriptor],
        options: &ExtractionOptions,
    ) -> Vec<&'a TenantDescriptor> {
        let filtered = tenants.iter().filter(|t| match &options.name_filter {
            Some(needle) => t.name_matches(needle),
            None => true,
        });
        match options.max_tenants {
            Some(max) => filtered.take(max).collect(),
            None => filtered.collect(),
        }
    }

    fn record_failure(report: &mut ExtractionReport, tenant: &TenantDescriptor, err: &HarvestError) {
        let reason = FailureReason::from_error(err).unwrap_or(FailureReason::QueryFatal);
        warn!(tenant = %tenant.id, %reason, error = %err, "tenant failed");
        report.failures.push(TenantFailure {
            tenant: tenant.id.clone(),
            reason,
            detail: err.to_string(),
        });
    }
}
