//! Sync pass state and reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use outbox_common::ItemId;

/// Engine state machine: `Idle -> Running -> Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No pass running.
    #[default]
    Idle,
    /// A pass is draining a snapshot.
    Running,
}

/// A queued item that could not be replayed in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFailure {
    pub id: ItemId,
    pub url: String,
    pub reason: String,
}

/// Aggregate result of one sync pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Items delivered and removed from the queue.
    pub succeeded: usize,
    /// Items left in the queue for the next pass.
    pub failed: usize,
    /// Items discarded for exceeding the maximum age.
    pub expired: usize,
    /// Why each failed item failed.
    pub failures: Vec<ReplayFailure>,
    /// Wall time of the pass.
    pub duration: Duration,
    /// When the pass finished.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncReport {
    /// Number of items the pass looked at.
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed + self.expired
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} synced, {} failed, {} expired in {:?}",
            self.succeeded, self.failed, self.expired, self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let report = SyncReport {
            succeeded: 2,
            failed: 1,
            expired: 1,
            ..Default::default()
        };
        assert_eq!(report.attempted(), 4);
        assert!(!report.is_clean());
        assert!(report.to_string().starts_with("2 synced, 1 failed, 1 expired"));
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&SyncState::Running).unwrap(), "\"running\"");
    }
}
