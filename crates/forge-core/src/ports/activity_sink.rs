//! ActivitySink port - activity log への書き込み
//!
//! 正本は外部（リレーショナル DB など）。core は append-only の sink として扱うだけ。

use async_trait::async_trait;

use crate::domain::ActivityRecord;
use crate::error::ForgeError;

#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, record: ActivityRecord) -> Result<(), ForgeError>;
}
