//! Serializable views for status/health reporting.

use serde::{Deserialize, Serialize};

use super::ids::WorkerId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub id: WorkerId,
    pub name: String,
    pub version: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub active: bool,
    /// Envelopes waiting in the mailbox at snapshot time.
    pub queued: usize,
}

impl WorkerMetrics {
    /// `succeeded / total`, or 0.0 before anything was handled.
    pub fn rate(succeeded: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryStatus {
    pub total_workers: usize,
    pub active_workers: usize,
    pub inactive_workers: usize,
    pub workers: Vec<WorkerMetrics>,
}

impl DirectoryStatus {
    pub fn from_metrics(mut workers: Vec<WorkerMetrics>) -> Self {
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        let active_workers = workers.iter().filter(|m| m.active).count();
        Self {
            total_workers: workers.len(),
            active_workers,
            inactive_workers: workers.len() - active_workers,
            workers,
        }
    }

    /// Sum of `total` over all workers.
    pub fn handled(&self) -> u64 {
        self.workers.iter().map(|m| m.total).sum()
    }

    /// Envelopes still waiting in any mailbox.
    pub fn queued(&self) -> usize {
        self.workers.iter().map(|m| m.queued).sum()
    }
}
