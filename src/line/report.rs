//! Point-in-time snapshots of a line

use crate::core::{Category, Result};
use crate::line::group::{GroupStats, GroupStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of a line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    /// Accepting pushes and dispatching
    Running,
    /// Ignoring pushes, draining queued work and follow-ups
    Draining,
    /// Coordinator stopped
    Terminated,
}

/// Snapshot of one group
#[derive(Clone, Debug, Serialize)]
pub struct GroupReport<K> {
    /// Creation order of the group within the line
    pub index: usize,
    /// Category served by the group
    pub category: K,
    /// Workers currently hired
    pub workers: usize,
    /// Workers available for new tasks
    pub idle: usize,
    /// Busy workers that leave when their task completes
    pub retiring: usize,
    /// Tasks waiting in the queue
    pub queued: usize,
    /// Lifetime counters
    pub stats: GroupStats,
}

impl<K> GroupReport<K> {
    /// The push/hire view of this group
    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            workers: self.workers,
            idle: self.idle,
            queued: self.queued,
        }
    }
}

/// Snapshot of a whole line, taken within one coordinator turn
#[derive(Clone, Debug, Serialize)]
pub struct Report<K> {
    /// Identifier of the line
    pub line_id: Uuid,
    /// When the coordinator produced the snapshot
    pub taken_at: DateTime<Utc>,
    /// Lifecycle state
    pub state: LineState,
    /// Whether pushes are accepted (false once finish was requested)
    pub accepting: bool,
    /// Whether a graceful finish is in progress
    pub drain_requested: bool,
    /// Callers blocked in `wait`
    pub waiters: usize,
    /// Tasks accepted and not yet completed, across all groups
    pub load: usize,
    /// Every group, in creation order
    pub groups: Vec<GroupReport<K>>,
}

impl<K: Category> Report<K> {
    /// The snapshot of one category's group
    pub fn group(&self, category: &K) -> Option<&GroupReport<K>> {
        self.groups.iter().find(|g| &g.category == category)
    }

    /// Workers hired across all groups
    pub fn total_workers(&self) -> usize {
        self.groups.iter().map(|g| g.workers).sum()
    }

    /// Pending tasks across all groups
    pub fn total_queued(&self) -> usize {
        self.groups.iter().map(|g| g.queued).sum()
    }

    /// Whether no task is queued or running
    pub fn is_quiescent(&self) -> bool {
        self.load == 0
    }
}

impl<K: Serialize> Report<K> {
    /// Render the report as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report<&'static str> {
        Report {
            line_id: Uuid::nil(),
            taken_at: Utc::now(),
            state: LineState::Draining,
            accepting: false,
            drain_requested: true,
            waiters: 0,
            load: 3,
            groups: vec![
                GroupReport {
                    index: 0,
                    category: "greet",
                    workers: 1,
                    idle: 0,
                    retiring: 0,
                    queued: 2,
                    stats: GroupStats::default(),
                },
                GroupReport {
                    index: 1,
                    category: "print",
                    workers: 8,
                    idle: 7,
                    retiring: 0,
                    queued: 0,
                    stats: GroupStats::default(),
                },
            ],
        }
    }

    #[test]
    fn test_lookup_and_totals() {
        let report = sample();
        assert_eq!(report.group(&"print").map(|g| g.idle), Some(7));
        assert!(report.group(&"audit").is_none());
        assert_eq!(report.total_workers(), 9);
        assert_eq!(report.total_queued(), 2);
        assert!(!report.is_quiescent());
        assert_eq!(
            report.groups[0].status(),
            GroupStatus { workers: 1, idle: 0, queued: 2 }
        );
    }

    #[test]
    fn test_to_json() {
        let json = sample().to_json().expect("report should serialize");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["state"], "draining");
        assert_eq!(value["accepting"], false);
        assert_eq!(value["groups"][1]["category"], "print");
        assert_eq!(value["groups"][1]["workers"], 8);
        assert_eq!(value["line_id"], "00000000-0000-0000-0000-000000000000");
    }
}
