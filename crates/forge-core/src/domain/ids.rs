//! Domain identifiers.
//!
//! - `EnvelopeId`: sender 名 + ULID。ULID は時刻でソート可能なので、同一プロセス内の
//!   送信順がそのまま ID の順序になる
//! - `WorkerId`: Directory のキー（"classify" など）。動的な lookup 用に文字列のまま持つ
//! - `CorrelationId`: request/response を結びつける不透明なトークン

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a worker registered in the `Directory`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique id of one envelope: `<sender>-<ulid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvelopeId {
    sender: WorkerId,
    ulid: Ulid,
}

impl EnvelopeId {
    pub fn new(sender: WorkerId, ulid: Ulid) -> Self {
        Self { sender, ulid }
    }

    pub fn sender(&self) -> &WorkerId {
        &self.sender
    }
}

// ULID 部分だけで比較する（sender が違っても生成順で並ぶ）
impl PartialOrd for EnvelopeId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EnvelopeId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid
            .cmp(&other.ulid)
            .then_with(|| self.sender.cmp(&other.sender))
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.sender, self.ulid)
    }
}

/// Opaque token linking a request envelope to its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
