//! Normalized record entities and their wire shapes.
//!
//! Records are keyed `(tenant, remote_id)`. Remote identifiers are NOT
//! globally unique across tenants, so records must never be deduplicated
//! across tenant boundaries; the composite [`RecordKey`] makes that hard to
//! get wrong.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::tenant::TenantId;

/// Composite key of any extracted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub tenant: TenantId,
    pub remote_id: String,
}

/// One tenant's company profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub tenant: TenantId,
    pub remote_id: String,
    pub name: String,
    pub extracted_at: DateTime<Utc>,
}

impl CompanyRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            tenant: self.tenant.clone(),
            remote_id: self.remote_id.clone(),
        }
    }
}

/// One job posting within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub tenant: TenantId,
    pub remote_id: String,
    pub title: String,
    pub status: String,
    pub location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            tenant: self.tenant.clone(),
            remote_id: self.remote_id.clone(),
        }
    }
}

/// One candidate within a tenant.
///
/// The day counters are recomputed from timestamps at extraction time and
/// are the only fields expected to differ between two runs against an
/// unchanged remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub tenant: TenantId,
    pub remote_id: String,
    pub name: String,

    /// Job this candidate is attached to, when the listing reports one
    pub job_remote_id: Option<String>,

    /// Current stage display name (e.g. "Onsite Interview")
    pub stage: String,

    /// Stage type/category (e.g. "interview", "offer", "screen")
    pub stage_type: String,

    pub status: Option<String>,

    /// Identity credited with sourcing this candidate
    pub attribution: Option<String>,

    pub created_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub stage_entered_at: Option<DateTime<Utc>>,

    /// Days since the last recorded activity, recomputed at extraction time
    pub days_since_activity: i64,

    /// Days spent in the current stage, recomputed at extraction time
    pub days_in_stage: i64,

    /// Filled only by the enrichment pipeline
    pub enrichment: Option<CandidateEnrichment>,
}

impl CandidateRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            tenant: self.tenant.clone(),
            remote_id: self.remote_id.clone(),
        }
    }

    /// Recompute the day counters against `now`.
    ///
    /// `days_since_activity` counts from the last activity timestamp and
    /// `days_in_stage` from the stage-entry timestamp; both fall back to
    /// the record's creation time when the remote omits the timestamp.
    pub fn recompute_days(&mut self, now: DateTime<Utc>) {
        let activity = self.last_activity_at.unwrap_or(self.created_at);
        self.days_since_activity = (now - activity).num_days();

        let entered = self.stage_entered_at.unwrap_or(self.created_at);
        self.days_in_stage = (now - entered).num_days();
    }
}

/// Secondary detail attached to a candidate by the enrichment pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEnrichment {
    #[serde(default)]
    pub interview_events: Vec<InterviewEvent>,

    #[serde(default)]
    pub feedback: Vec<FeedbackEntry>,
}

/// One interview event from a candidate's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewEvent {
    pub remote_id: String,
    pub title: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub interviewer: Option<String>,
}

/// One feedback entry from a candidate's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub author: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Job entry as the listing query returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobWire {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl JobWire {
    pub fn into_record(self, tenant: &TenantId) -> JobRecord {
        JobRecord {
            tenant: tenant.clone(),
            remote_id: self.id,
            title: self.title,
            status: self.status.unwrap_or_else(|| "unknown".into()),
            location: self.location,
            created_at: self.created_at,
        }
    }
}

/// Candidate entry as the listing query returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CandidateWire {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub stage_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub credited_to: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stage_entered_at: Option<DateTime<Utc>>,
}

impl CandidateWire {
    pub fn into_record(self, tenant: &TenantId, now: DateTime<Utc>) -> CandidateRecord {
        let mut record = CandidateRecord {
            tenant: tenant.clone(),
            remote_id: self.id,
            name: self.name,
            job_remote_id: self.job_id,
            stage: self.stage.unwrap_or_else(|| "unknown".into()),
            stage_type: self.stage_type.unwrap_or_else(|| "unknown".into()),
            status: self.status,
            attribution: self.credited_to,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            stage_entered_at: self.stage_entered_at,
            days_since_activity: 0,
            days_in_stage: 0,
            enrichment: None,
        };
        record.recompute_days(now);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(created_days_ago: i64) -> CandidateRecord {
        let now = Utc::now();
        CandidateRecord {
            tenant: TenantId::new("org_1"),
            remote_id: "cand_1".into(),
            name: "Ada".into(),
            job_remote_id: None,
            stage: "Onsite".into(),
            stage_type: "interview".into(),
            status: None,
            attribution: None,
            created_at: now - Duration::days(created_days_ago),
            last_activity_at: None,
            stage_entered_at: None,
            days_since_activity: 0,
            days_in_stage: 0,
            enrichment: None,
        }
    }

    #[test]
    fn day_counters_fall_back_to_creation_time() {
        let mut record = candidate(10);
        record.recompute_days(Utc::now());
        assert_eq!(record.days_since_activity, 10);
        assert_eq!(record.days_in_stage, 10);
    }

    #[test]
    fn day_counters_prefer_specific_timestamps() {
        let now = Utc::now();
        let mut record = candidate(30);
        record.last_activity_at = Some(now - Duration::days(2));
        record.stage_entered_at = Some(now - Duration::days(5));
        record.recompute_days(now);
        assert_eq!(record.days_since_activity, 2);
        assert_eq!(record.days_in_stage, 5);
    }

    #[test]
    fn keys_separate_identical_remote_ids_across_tenants() {
        let mut a = candidate(1);
        let mut b = candidate(1);
        a.tenant = TenantId::new("org_a");
        b.tenant = TenantId::new("org_b");
        assert_ne!(a.key(), b.key());
    }
}
