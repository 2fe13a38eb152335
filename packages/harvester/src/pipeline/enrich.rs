//! Per-record detail enrichment.
//!
//! Base extraction leaves candidates without their interview events and
//! feedback; those live behind a per-candidate detail query. The pipeline
//! re-groups records by tenant so each tenant's context is switched at most
//! once, then fans the detail fetches out under a concurrency cap. Detail
//! fetches are read-only and independent of each other once the tenant is
//! bound, which makes this the one place in the library where requests
//! intentionally overlap.
//!
//! Failure here is always soft: a record whose detail fetch fails keeps its
//! base fields and simply stays unenriched.

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::CredentialRefresher;
use crate::catalogs::ResolvedOperations;
use crate::pipeline::policy::SchedulingPolicy;
use crate::switcher::TenantContextSwitcher;
use crate::traits::transport::Transport;
use crate::types::query::QueryEnvelope;
use crate::types::record::{CandidateEnrichment, CandidateRecord, FeedbackEntry, InterviewEvent};
use crate::types::session::SessionState;
use crate::types::tenant::{TenantDescriptor, TenantId};

const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, Deserialize)]
struct DetailData {
    candidate: Option<DetailWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailWire {
    #[serde(default)]
    interview_events: Vec<InterviewEvent>,
    #[serde(default)]
    feedback: Vec<FeedbackEntry>,
}

/// Knobs for one enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Maximum detail fetches in flight at once within a tenant group
    pub max_concurrent: usize,

    /// Only fetch detail for records the scheduling policy flags; others
    /// pass through untouched without a network call
    pub only_if_flagged: bool,

    /// The predicate used when `only_if_flagged` is set
    pub policy: SchedulingPolicy,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            only_if_flagged: true,
            policy: SchedulingPolicy::default(),
        }
    }
}

impl EnrichOptions {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn enrich_everything(mut self) -> Self {
        self.only_if_flagged = false;
        self
    }

    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Fetches secondary detail for already-extracted candidates.
pub struct EnrichmentPipeline {
    refresher: CredentialRefresher,
    ops: ResolvedOperations,
}

impl EnrichmentPipeline {
    pub fn new(refresher: CredentialRefresher, ops: ResolvedOperations) -> Self {
        Self { refresher, ops }
    }

    /// Enrich the given records in place, returning the full set.
    pub async fn enrich<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        switcher: &mut TenantContextSwitcher,
        tenants: &[TenantDescriptor],
        records: Vec<CandidateRecord>,
        options: &EnrichOptions,
    ) -> Vec<CandidateRecord> {
        self.enrich_with_cancel(
            transport,
            session,
            switcher,
            tenants,
            records,
            options,
            CancellationToken::new(),
        )
        .await
    }

    /// Enrich with cancellation support.
    ///
    /// Cancellation is honored between tenant groups: in-flight fetches of
    /// the current group drain, later groups pass through unenriched, and
    /// every input record comes back either way.
    #[allow(clippy::too_many_arguments)]
    pub async fn enrich_with_cancel<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        switcher: &mut TenantContextSwitcher,
        tenants: &[TenantDescriptor],
        records: Vec<CandidateRecord>,
        options: &EnrichOptions,
        cancel: CancellationToken,
    ) -> Vec<CandidateRecord> {
        // Group by tenant so each tenant's context is bound at most once.
        let mut groups: IndexMap<TenantId, Vec<CandidateRecord>> = IndexMap::new();
        for record in records {
            groups.entry(record.tenant.clone()).or_default().push(record);
        }

        let mut output = Vec::new();
        let mut groups = groups.into_iter();
        let mut stopped = false;

        while let Some((tenant_id, group)) = groups.next() {
            if stopped || cancel.is_cancelled() {
                if !stopped {
                    warn!("cancellation requested; passing remaining groups through unenriched");
                    stopped = true;
                }
                output.extend(group);
                continue;
            }

            let (eligible, passthrough): (Vec<_>, Vec<_>) = if options.only_if_flagged {
                group
                    .into_iter()
                    .partition(|r| options.policy.needs_scheduling(r))
            } else {
                (group, Vec::new())
            };

            if eligible.is_empty() {
                output.extend(passthrough);
                continue;
            }

            debug!(
                tenant = %tenant_id,
                eligible = eligible.len(),
                passthrough = passthrough.len(),
                "enriching tenant group"
            );

            if !self
                .bind_tenant(transport, session, switcher, tenants, &tenant_id)
                .await
            {
                output.extend(eligible);
                output.extend(passthrough);
                continue;
            }

            if let Err(err) = self.refresher.ensure_token(transport, session, false).await {
                // Token trouble here means the session is done for;
                // everything left passes through untouched.
                warn!(error = %err, "token refresh failed; stopping enrichment");
                output.extend(eligible);
                output.extend(passthrough);
                stopped = true;
                continue;
            }

            let snapshot: &SessionState = session;
            let enriched: Vec<CandidateRecord> = stream::iter(eligible)
                .map(|record| self.fetch_detail(transport, snapshot, record))
                .buffered(options.max_concurrent)
                .collect()
                .await;

            let done = enriched.iter().filter(|r| r.enrichment.is_some()).count();
            info!(tenant = %tenant_id, enriched = done, total = enriched.len(), "tenant group enriched");
            output.extend(enriched);
            output.extend(passthrough);
        }

        output
    }

    /// Make sure the session is bound to `tenant_id`, reusing the current
    /// binding when it already matches. Returns false when the group must
    /// be skipped.
    async fn bind_tenant<T: Transport>(
        &self,
        transport: &T,
        session: &mut SessionState,
        switcher: &mut TenantContextSwitcher,
        tenants: &[TenantDescriptor],
        tenant_id: &TenantId,
    ) -> bool {
        if switcher.bound_tenant() == Some(tenant_id) {
            debug!(tenant = %tenant_id, "already bound; skipping redundant switch");
            return true;
        }

        let Some(descriptor) = tenants.iter().find(|t| &t.id == tenant_id) else {
            warn!(tenant = %tenant_id, "no descriptor for tenant; leaving group unenriched");
            return false;
        };

        match switcher.switch(transport, session, descriptor, &self.ops).await {
            Ok(()) => true,
            Err(err) => {
                warn!(tenant = %tenant_id, error = %err, "switch failed; leaving group unenriched");
                switcher.reset();
                false
            }
        }
    }

    /// Fetch one candidate's detail. Never fails: on any error the record
    /// comes back unchanged.
    async fn fetch_detail<T: Transport>(
        &self,
        transport: &T,
        session: &SessionState,
        mut record: CandidateRecord,
    ) -> CandidateRecord {
        let variables = json!({ "id": record.remote_id });
        let raw = match transport
            .execute(session, &self.ops.candidate_detail, variables)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                warn!(candidate = %record.remote_id, error = %err, "detail fetch failed");
                return record;
            }
        };

        let envelope: QueryEnvelope = match serde_json::from_value(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(candidate = %record.remote_id, error = %err, "unparseable detail envelope");
                return record;
            }
        };
        if !envelope.errors.is_empty() {
            warn!(
                candidate = %record.remote_id,
                error = %envelope.errors[0].message,
                "detail query reported errors"
            );
            return record;
        }

        let detail: DetailData = match envelope
            .data
            .ok_or_else(|| "empty data".to_string())
            .and_then(|d| serde_json::from_value(d).map_err(|e| e.to_string()))
        {
            Ok(detail) => detail,
            Err(err) => {
                warn!(candidate = %record.remote_id, error = %err, "unparseable detail payload");
                return record;
            }
        };

        if let Some(wire) = detail.candidate {
            record.enrichment = Some(CandidateEnrichment {
                interview_events: wire.interview_events,
                feedback: wire.feedback,
            });
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RetryPolicy;
    use crate::catalogs::CatalogChain;
    use crate::executor::QueryExecutor;
    use crate::testing::MockTransport;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn resolved() -> ResolvedOperations {
        ResolvedOperations::resolve(&CatalogChain::builtin_only()).unwrap()
    }

    fn pipeline() -> EnrichmentPipeline {
        EnrichmentPipeline::new(CredentialRefresher::default(), resolved())
    }

    fn switcher() -> TenantContextSwitcher {
        let refresher = CredentialRefresher::default();
        let executor = QueryExecutor::new(refresher.clone(), RetryPolicy::no_retries());
        TenantContextSwitcher::new(refresher, executor)
    }

    fn session() -> SessionState {
        SessionState::from_credentials([("sid", "s3cret")])
    }

    fn candidate(tenant: &str, id: &str, stage_type: &str, days_in_stage: i64) -> CandidateRecord {
        CandidateRecord {
            tenant: TenantId::new(tenant),
            remote_id: id.into(),
            name: format!("Candidate {id}"),
            job_remote_id: None,
            stage: "Stage".into(),
            stage_type: stage_type.into(),
            status: None,
            attribution: None,
            created_at: Utc::now() - ChronoDuration::days(days_in_stage),
            last_activity_at: None,
            stage_entered_at: Some(Utc::now() - ChronoDuration::days(days_in_stage)),
            days_since_activity: days_in_stage,
            days_in_stage,
            enrichment: None,
        }
    }

    fn acme_tenants() -> Vec<TenantDescriptor> {
        vec![
            TenantDescriptor::new("org_a", Some("Acme".into()), "mem_a"),
            TenantDescriptor::new("org_b", Some("Globex".into()), "mem_b"),
        ]
    }

    #[tokio::test]
    async fn concurrency_stays_within_the_cap() {
        let transport = MockTransport::new()
            .with_membership("mem_a", "org_a", None)
            .with_execute_delay(Duration::from_millis(20));
        let mut session = session();
        let mut sw = switcher();

        let records: Vec<_> = (0..5)
            .map(|i| candidate("org_a", &format!("c{i}"), "interview", 10))
            .collect();

        let options = EnrichOptions::default().with_max_concurrent(2);
        let enriched = pipeline()
            .enrich(&transport, &mut session, &mut sw, &acme_tenants(), records, &options)
            .await;

        assert_eq!(enriched.len(), 5);
        assert!(enriched.iter().all(|r| r.enrichment.is_some()));
        assert!(
            transport.max_observed_in_flight() <= 2,
            "observed {} concurrent fetches",
            transport.max_observed_in_flight()
        );
    }

    #[tokio::test]
    async fn unflagged_records_pass_through_without_a_call() {
        let transport = MockTransport::new().with_membership("mem_a", "org_a", None);
        let mut session = session();
        let mut sw = switcher();

        let records = vec![
            candidate("org_a", "hot", "interview", 8),
            candidate("org_a", "cold", "offer", 30),
        ];

        let enriched = pipeline()
            .enrich(
                &transport,
                &mut session,
                &mut sw,
                &acme_tenants(),
                records,
                &EnrichOptions::default(),
            )
            .await;

        assert_eq!(transport.execute_calls("CandidateDetail"), 1);
        let hot = enriched.iter().find(|r| r.remote_id == "hot").unwrap();
        let cold = enriched.iter().find(|r| r.remote_id == "cold").unwrap();
        assert!(hot.enrichment.is_some());
        assert!(cold.enrichment.is_none());
    }

    #[tokio::test]
    async fn failed_detail_fetch_keeps_the_base_record() {
        let transport = MockTransport::new()
            .with_membership("mem_a", "org_a", None)
            .fail_query_times("CandidateDetail", 1, || {
                crate::error::TransportError::Server(500)
            });
        let mut session = session();
        let mut sw = switcher();

        let records = vec![
            candidate("org_a", "c1", "interview", 10),
            candidate("org_a", "c2", "interview", 10),
        ];

        let options = EnrichOptions::default().with_max_concurrent(1);
        let enriched = pipeline()
            .enrich(&transport, &mut session, &mut sw, &acme_tenants(), records, &options)
            .await;

        // Both records survive; the one whose fetch failed stays bare.
        assert_eq!(enriched.len(), 2);
        assert!(enriched[0].enrichment.is_none());
        assert!(enriched[1].enrichment.is_some());
    }

    #[tokio::test]
    async fn reuses_an_existing_binding() {
        let transport = MockTransport::new()
            .with_membership("mem_a", "org_a", None)
            .with_bound_tenant("org_a");
        let mut session = session();
        let mut sw = switcher();

        // Bind org_a the usual way first, as the orchestrator would have.
        sw.switch(
            &transport,
            &mut session,
            &acme_tenants()[0],
            &resolved(),
        )
        .await
        .unwrap();
        let switches_before = transport.switch_calls();

        let records = vec![candidate("org_a", "c1", "interview", 10)];
        pipeline()
            .enrich(
                &transport,
                &mut session,
                &mut sw,
                &acme_tenants(),
                records,
                &EnrichOptions::default(),
            )
            .await;

        assert_eq!(transport.switch_calls(), switches_before);
    }

    #[tokio::test]
    async fn groups_are_switched_once_per_tenant() {
        let transport = MockTransport::new()
            .with_membership("mem_a", "org_a", None)
            .with_membership("mem_b", "org_b", None);
        let mut session = session();
        let mut sw = switcher();

        let records = vec![
            candidate("org_a", "a1", "interview", 10),
            candidate("org_b", "b1", "interview", 10),
            candidate("org_a", "a2", "interview", 10),
        ];

        let enriched = pipeline()
            .enrich(
                &transport,
                &mut session,
                &mut sw,
                &acme_tenants(),
                records,
                &EnrichOptions::default(),
            )
            .await;

        assert_eq!(enriched.len(), 3);
        // org_a's two records share one switch despite arriving interleaved.
        assert_eq!(transport.switch_calls(), 2);
    }

    #[tokio::test]
    async fn cancellation_passes_remaining_groups_through() {
        let transport = MockTransport::new()
            .with_membership("mem_a", "org_a", None)
            .with_membership("mem_b", "org_b", None);
        let mut session = session();
        let mut sw = switcher();

        let records = vec![
            candidate("org_a", "a1", "interview", 10),
            candidate("org_b", "b1", "interview", 10),
        ];

        let cancel = CancellationToken::new();
        cancel.cancel();
        let enriched = pipeline()
            .enrich_with_cancel(
                &transport,
                &mut session,
                &mut sw,
                &acme_tenants(),
                records,
                &EnrichOptions::default(),
                cancel,
            )
            .await;

        assert_eq!(enriched.len(), 2);
        assert!(enriched.iter().all(|r| r.enrichment.is_none()));
        assert_eq!(transport.execute_calls("CandidateDetail"), 0);
    }

    #[tokio::test]
    async fn scripted_detail_content_lands_on_the_record() {
        let transport = MockTransport::new()
            .with_membership("mem_a", "org_a", None)
            .with_query_response(
                "CandidateDetail",
                serde_json::json!({
                    "candidate": {
                        "id": "c1",
                        "interviewEvents": [{
                            "remoteId": "ev_1",
                            "title": "Onsite loop",
                            "scheduledAt": "2025-07-01T15:00:00Z",
                            "interviewer": "Grace"
                        }],
                        "feedback": [{
                            "author": "Grace",
                            "submittedAt": "2025-07-02T09:00:00Z",
                            "summary": "Strong hire"
                        }]
                    }
                }),
            );
        let mut session = session();
        let mut sw = switcher();

        let records = vec![candidate("org_a", "c1", "interview", 10)];
        let enriched = pipeline()
            .enrich(
                &transport,
                &mut session,
                &mut sw,
                &acme_tenants(),
                records,
                &EnrichOptions::default(),
            )
            .await;

        let enrichment = enriched[0].enrichment.as_ref().unwrap();
        assert_eq!(enrichment.interview_events.len(), 1);
        assert_eq!(enrichment.interview_events[0].title, "Onsite loop");
        assert_eq!(enrichment.feedback[0].author, "Grace");
    }
}
