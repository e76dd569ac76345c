//! Envelope - worker 間を流れる不変のメッセージ
//!
//! 一度作ったら変更しない。reply や pipeline の hand-off は必ず新しい Envelope を作る。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CorrelationId, EnvelopeId, WorkerId};

/// Stage-specific key/value payload. The core never enforces a schema.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Verb selecting behavior inside the recipient (`classify_idea`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The action used for the reply to a correlated request.
    pub fn response(&self) -> Action {
        Action(format!("{}_response", self.0))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    id: EnvelopeId,
    sender: WorkerId,
    recipient: WorkerId,
    action: Action,
    payload: Payload,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<CorrelationId>,
}

impl Envelope {
    pub fn new(
        id: EnvelopeId,
        recipient: WorkerId,
        action: Action,
        payload: Payload,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sender: id.sender().clone(),
            id,
            recipient,
            action,
            payload,
            timestamp,
            correlation_id: None,
        }
    }

    /// Consuming builder step; only usable before the envelope is shared.
    pub fn with_correlation(mut self, correlation_id: Option<CorrelationId>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn id(&self) -> &EnvelopeId {
        &self.id
    }

    pub fn sender(&self) -> &WorkerId {
        &self.sender
    }

    pub fn recipient(&self) -> &WorkerId {
        &self.recipient
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// `idea_id` (or camelCase `ideaId`) is the one payload key the core
    /// looks at (activity records).
    pub fn idea_id(&self) -> Option<&str> {
        self.payload
            .get("idea_id")
            .or_else(|| self.payload.get("ideaId"))
            .and_then(|v| v.as_str())
    }
}
