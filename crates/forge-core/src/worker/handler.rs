//! StageHandler - 各 stage が実装する唯一の hook
//!
//! worker の loop が `handle()` を呼び、成功なら結果 payload を、失敗なら
//! `HandlerError` を受け取る。エラーは loop で記録されて握りつぶされ、
//! worker の境界を越えて伝播しない。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use ulid::Ulid;

use crate::app::directory::{Directory, RouteOutcome};
use crate::domain::{Action, CorrelationId, Envelope, Payload, WorkerId};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unsupported action `{0}`")]
    UnsupportedAction(Action),

    #[error("unsupported input type `{0}`")]
    UnsupportedInput(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Application logic of one stage.
///
/// 戻り値の payload が空でなく、かつ受け取った envelope に correlation_id があれば、
/// worker が `<action>_response` を送信元に返す。
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError>;

    /// Worker ids this stage may send to. Checked once at wiring time.
    fn downstream(&self) -> Vec<WorkerId> {
        Vec::new()
    }
}

/// What a handler can reach while it runs: its own identity and the directory.
#[derive(Clone)]
pub struct WorkerContext {
    worker_id: WorkerId,
    directory: Arc<Directory>,
}

impl WorkerContext {
    pub fn new(worker_id: WorkerId, directory: Arc<Directory>) -> Self {
        Self {
            worker_id,
            directory,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.directory.clock().now()
    }

    pub fn new_ulid(&self) -> Ulid {
        self.directory.ids().next_ulid()
    }

    /// Build an envelope stamped with this worker as sender and route it.
    pub async fn send(
        &self,
        recipient: impl Into<WorkerId>,
        action: impl Into<Action>,
        payload: Payload,
        correlation_id: Option<CorrelationId>,
    ) -> RouteOutcome {
        self.directory
            .send(&self.worker_id, recipient.into(), action.into(), payload, correlation_id)
            .await
    }
}
