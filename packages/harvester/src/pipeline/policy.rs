//! The scheduling-needed predicate.
//!
//! Kept as an explicit, documented policy rather than inline string
//! matching so the product can tune it (and tests can pin it) in one place.

use crate::types::record::CandidateRecord;

const DEFAULT_MIN_DAYS_IN_STAGE: i64 = 7;

/// Decides which candidates look stuck in a stage that needs a scheduling
/// nudge.
///
/// A candidate is flagged when its stage type contains any of the
/// configured keywords (case-insensitive) AND it has sat in that stage for
/// at least `min_days_in_stage` days. Stage types outside the keyword set
/// ("offer", "screen", ...) are never flagged, no matter how long they
/// linger.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    /// Substrings matched against the stage type
    pub stage_keywords: Vec<String>,

    /// Minimum days in the current stage before flagging
    pub min_days_in_stage: i64,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            stage_keywords: vec!["interview".to_string()],
            min_days_in_stage: DEFAULT_MIN_DAYS_IN_STAGE,
        }
    }
}

impl SchedulingPolicy {
    pub fn new(
        keywords: impl IntoIterator<Item = impl Into<String>>,
        min_days_in_stage: i64,
    ) -> Self {
        Self {
            stage_keywords: keywords.into_iter().map(|k| k.into()).collect(),
            min_days_in_stage,
        }
    }

    /// Whether this candidate needs scheduling attention.
    pub fn needs_scheduling(&self, record: &CandidateRecord) -> bool {
        if record.days_in_stage < self.min_days_in_stage {
            return false;
        }
        let stage_type = record.stage_type.to_lowercase();
        self.stage_keywords
            .iter()
            .any(|kw| stage_type.contains(&kw.to_lowercase()))
    }
}
