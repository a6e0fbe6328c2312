use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::store::Artifact;

/// Age threshold for one artifact category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_age_days: u32,
}

impl RetentionPolicy {
    pub fn new(max_age_days: u32) -> Self {
        Self { max_age_days }
    }

    pub fn max_age(&self) -> Duration {
        Duration::days(i64::from(self.max_age_days))
    }

    pub fn is_expired(&self, artifact: &Artifact, now: DateTime<Utc>) -> bool {
        now - artifact.created_at > self.max_age()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrunePlan {
    /// Survivors, newest first
    pub keep: Vec<Artifact>,
    pub remove: Vec<Artifact>,
}

/// Splits a category's artifacts into survivors and expired ones.
///
/// The newest artifact is always kept regardless of age; every other artifact
/// survives only while it is within the policy's age window.
pub fn plan_prune(
    mut artifacts: Vec<Artifact>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> PrunePlan {
    artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut plan = PrunePlan::default();
    let mut iter = artifacts.into_iter();

    if let Some(newest) = iter.next() {
        plan.keep.push(newest);
    }

    for artifact in iter {
        if policy.is_expired(&artifact, now) {
            plan.remove.push(artifact);
        } else {
            plan.keep.push(artifact);
        }
    }

    plan
}
