//! Condition assignment
//!
//! A participant keeps the condition stored on their record. New
//! participants are balanced over stored participants plus those assigned
//! in this process whose record is not written yet (the first save happens
//! at the demographics step). When the store cannot be read the assigner
//! rotates through the conditions in-process so the participant can still
//! continue.

use nrs_common::db::participants;
use nrs_common::study::{AssignmentPolicy, Condition};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct ConditionAssigner {
    policy: AssignmentPolicy,
    /// Assigned but not yet stored, by participant identifier
    pending: Mutex<HashMap<String, Condition>>,
    fallback: AtomicUsize,
}

impl ConditionAssigner {
    pub fn new(policy: AssignmentPolicy) -> Self {
        Self {
            policy,
            pending: Mutex::new(HashMap::new()),
            fallback: AtomicUsize::new(0),
        }
    }

    /// Condition for a participant on first contact
    ///
    /// Assignments are serialized so concurrent arrivals see each other.
    pub async fn assign(&self, pool: &SqlitePool, prolific_id: &str) -> Condition {
        let mut pending = self.pending.lock().await;

        match participants::find_by_prolific_id(pool, prolific_id).await {
            Ok(Some(row)) => {
                if let Some(condition) = row.condition() {
                    pending.remove(prolific_id);
                    return condition;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not look up participant {}: {}", prolific_id, e),
        }

        if let Some(condition) = pending.get(prolific_id) {
            return *condition;
        }

        match self.balanced(pool, &mut pending).await {
            Ok(condition) => {
                pending.insert(prolific_id.to_string(), condition);
                condition
            }
            Err(e) => {
                let next = self.fallback.fetch_add(1, Ordering::Relaxed);
                warn!("Condition counts unavailable ({}); rotating in-process", e);
                Condition::ALL[next % Condition::ALL.len()]
            }
        }
    }

    /// Record an explicit override for a participant not stored yet
    pub async fn override_pending(&self, prolific_id: &str, condition: Condition) {
        if let Some(slot) = self.pending.lock().await.get_mut(prolific_id) {
            *slot = condition;
        }
    }

    /// Forget unsaved assignments (after the study data is reset)
    pub async fn clear_pending(&self) {
        let mut pending = self.pending.lock().await;
        debug!("Dropping {} pending condition assignment(s)", pending.len());
        pending.clear();
    }

    async fn balanced(
        &self,
        pool: &SqlitePool,
        pending: &mut HashMap<String, Condition>,
    ) -> nrs_common::Result<Condition> {
        let stored = participants::prolific_ids(pool).await?;
        pending.retain(|pid, _| !stored.contains(pid));

        match self.policy {
            AssignmentPolicy::LeastCount => {
                let mut counts = participants::condition_counts(pool).await?;
                for condition in pending.values() {
                    *counts.entry(*condition).or_insert(0) += 1;
                }
                Ok(least_count(&counts))
            }
            AssignmentPolicy::RoundRobin => {
                let total = participants::count(pool).await? + pending.len() as i64;
                Ok(round_robin(total))
            }
        }
    }
}

/// Condition with the fewest participants, ties by declaration order
pub fn least_count(counts: &HashMap<Condition, i64>) -> Condition {
    Condition::ALL
        .into_iter()
        .min_by_key(|c| counts.get(c).copied().unwrap_or(0))
        .unwrap_or(Condition::Color)
}

/// `total mod number_of_conditions`
pub fn round_robin(total_participants: i64) -> Condition {
    let n = Condition::ALL.len() as i64;
    Condition::ALL[total_participants.rem_euclid(n) as usize]
}
