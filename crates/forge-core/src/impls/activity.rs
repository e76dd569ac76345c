//! ActivitySink implementations.
//!
//! - **NoopActivitySink**: 何もしない
//! - **InMemoryActivitySink**: Vec に貯める（テスト・CLI 用）
//! - **TracingActivitySink**: tracing のイベントとして出す

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{ActivityRecord, ActivityStatus, WorkerId};
use crate::error::ForgeError;
use crate::ports::ActivitySink;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivitySink;

#[async_trait]
impl ActivitySink for NoopActivitySink {
    async fn record(&self, _record: ActivityRecord) -> Result<(), ForgeError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryActivitySink {
    records: Mutex<Vec<ActivityRecord>>,
}

impl InMemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().await.clone()
    }

    pub async fn for_worker(&self, worker_id: &WorkerId) -> Vec<ActivityRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| &r.worker_id == worker_id)
            .cloned()
            .collect()
    }

    /// Finished (completed or failed) records only, in arrival order.
    pub async fn finished(&self) -> Vec<ActivityRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.status != ActivityStatus::Started)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivitySink {
    async fn record(&self, record: ActivityRecord) -> Result<(), ForgeError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivitySink;

#[async_trait]
impl ActivitySink for TracingActivitySink {
    async fn record(&self, record: ActivityRecord) -> Result<(), ForgeError> {
        let idea = record.idea_id.as_deref().unwrap_or("-");
        match record.status {
            ActivityStatus::Started => debug!(
                worker = %record.worker_id,
                envelope = %record.envelope_id,
                action = %record.action,
                idea,
                "activity started"
            ),
            ActivityStatus::Completed => info!(
                worker = %record.worker_id,
                envelope = %record.envelope_id,
                action = %record.action,
                idea,
                duration_ms = record.duration_ms.unwrap_or_default(),
                "activity completed"
            ),
            ActivityStatus::Failed => warn!(
                worker = %record.worker_id,
                envelope = %record.envelope_id,
                action = %record.action,
                idea,
                duration_ms = record.duration_ms.unwrap_or_default(),
                error = record.error_message.as_deref().unwrap_or(""),
                "activity failed"
            ),
        }
        Ok(())
    }
}
