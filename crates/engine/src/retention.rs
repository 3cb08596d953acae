//! Retention policy for snapshot history
//!
//! Controls how much history each owner keeps after an optimization pass.
//!
//! # Policy Types
//!
//! - **KeepAll**: Keep every snapshot (default, safest)
//! - **KeepLast(n)**: Keep only the n most recent snapshots
//! - **KeepFor(duration)**: Keep snapshots newer than `now - duration`
//!
//! # Example
//!
//! ```
//! use datasync_engine::RetentionPolicy;
//! use std::time::Duration;
//!
//! let policy = RetentionPolicy::keep_last(10);
//! let policy = RetentionPolicy::keep_for(Duration::from_secs(7 * 24 * 3600));
//! ```

use datasync_core::{SnapshotKey, Timestamp};
use std::time::Duration;

/// Retention policy applied per owner
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Keep every snapshot
    ///
    /// No history is ever deleted. This is the default.
    #[default]
    KeepAll,

    /// Keep only the last N snapshots
    ///
    /// Snapshots beyond the Nth newest become eligible for removal.
    /// N must be at least 1.
    KeepLast(usize),

    /// Keep snapshots newer than the specified duration
    ///
    /// Duration must be non-zero.
    KeepFor(Duration),
}

/// Keep/drop decision for one owner's history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Keys to keep, newest first
    pub keep: Vec<SnapshotKey>,
    /// Keys to delete, newest first
    pub drop: Vec<SnapshotKey>,
}

impl RetentionPolicy {
    /// Create a KeepAll policy
    pub fn keep_all() -> Self {
        RetentionPolicy::KeepAll
    }

    /// Create a KeepLast policy
    ///
    /// # Panics
    ///
    /// Panics if n is 0.
    pub fn keep_last(n: usize) -> Self {
        assert!(n > 0, "KeepLast(n) requires n > 0");
        RetentionPolicy::KeepLast(n)
    }

    /// Create a KeepFor policy
    ///
    /// # Panics
    ///
    /// Panics if duration is zero.
    pub fn keep_for(duration: Duration) -> Self {
        assert!(!duration.is_zero(), "KeepFor requires non-zero duration");
        RetentionPolicy::KeepFor(duration)
    }

    /// Check if a snapshot should be retained
    ///
    /// # Arguments
    ///
    /// * `created_at` - Creation time of the snapshot
    /// * `count` - Number of snapshots at least as new as this one, itself included
    /// * `now` - Current time
    pub fn should_retain(&self, created_at: Timestamp, count: usize, now: Timestamp) -> bool {
        match self {
            RetentionPolicy::KeepAll => true,
            RetentionPolicy::KeepLast(n) => count <= *n,
            RetentionPolicy::KeepFor(duration) => created_at >= now.saturating_sub(*duration),
        }
    }

    /// Split `history` into keep and drop lists
    ///
    /// `reserved` counts snapshots newer than everything in `history` that
    /// are not part of it (a snapshot uploaded in the same pass); they take
    /// up `KeepLast` slots but are never dropped.
    pub fn plan(
        &self,
        history: &[(SnapshotKey, Timestamp)],
        now: Timestamp,
        reserved: usize,
    ) -> RetentionPlan {
        let mut sorted = history.to_vec();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        let mut plan = RetentionPlan::default();
        for (i, (key, created_at)) in sorted.into_iter().enumerate() {
            if self.should_retain(created_at, i + 1 + reserved, now) {
                plan.keep.push(key);
            } else {
                plan.drop.push(key);
            }
        }
        plan
    }

    /// Get a human-readable summary of the policy
    pub fn summary(&self) -> String {
        match self {
            RetentionPolicy::KeepAll => "KeepAll".to_string(),
            RetentionPolicy::KeepLast(n) => format!("KeepLast({})", n),
            RetentionPolicy::KeepFor(d) => format!("KeepFor({:?})", d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(secs: &[u64]) -> Vec<(SnapshotKey, Timestamp)> {
        secs.iter()
            .map(|s| {
                let ts = Timestamp::from_secs(*s);
                (SnapshotKey::at(ts), ts)
            })
            .collect()
    }

    #[test]
    fn test_keep_all_policy() {
        let policy = RetentionPolicy::keep_all();
        assert!(policy.should_retain(Timestamp::EPOCH, 1_000_000, Timestamp::from_secs(1)));
        let plan = policy.plan(&history(&[1, 2, 3]), Timestamp::from_secs(10), 1);
        assert_eq!(plan.keep.len(), 3);
        assert!(plan.drop.is_empty());
    }

    #[test]
    fn test_keep_last_drops_oldest() {
        let h = history(&[20, 10, 40, 30]);
        let plan = RetentionPolicy::keep_last(2).plan(&h, Timestamp::from_secs(50), 0);
        assert_eq!(plan.keep, vec![h[2].0, h[3].0]);
        assert_eq!(plan.drop, vec![h[0].0, h[1].0]);
    }

    #[test]
    fn test_keep_last_counts_reserved() {
        let h = history(&[10, 20, 30]);
        let plan = RetentionPolicy::keep_last(2).plan(&h, Timestamp::from_secs(50), 1);
        assert_eq!(plan.keep, vec![h[2].0]);
        assert_eq!(plan.drop.len(), 2);
    }

    #[test]
    fn test_keep_for_uses_cutoff() {
        let h = history(&[100, 170, 200]);
        let policy = RetentionPolicy::keep_for(Duration::from_secs(60));
        let plan = policy.plan(&h, Timestamp::from_secs(200), 0);
        assert_eq!(plan.keep, vec![h[2].0, h[1].0]);
        assert_eq!(plan.drop, vec![h[0].0]);
    }

    #[test]
    #[should_panic(expected = "KeepLast(n) requires n > 0")]
    fn test_keep_last_zero_panics() {
        RetentionPolicy::keep_last(0);
    }

    #[test]
    #[should_panic(expected = "KeepFor requires non-zero duration")]
    fn test_keep_for_zero_panics() {
        RetentionPolicy::keep_for(Duration::ZERO);
    }

    #[test]
    fn test_policy_summary() {
        assert_eq!(RetentionPolicy::keep_all().summary(), "KeepAll");
        assert_eq!(RetentionPolicy::keep_last(5).summary(), "KeepLast(5)");
    }
}
