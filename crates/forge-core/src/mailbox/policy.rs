//! Mailbox bound and overflow policy.

use serde::{Deserialize, Serialize};

/// What a full mailbox does with a new envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// No bound at all; `capacity` is ignored.
    #[default]
    Unbounded,
    /// Producer waits until the consumer makes room.
    Block,
    /// The incoming envelope is discarded.
    DropNewest,
    /// The oldest queued envelope is discarded to make room.
    DropOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub policy: OverflowPolicy,
}

fn default_capacity() -> usize {
    1024
}

impl MailboxConfig {
    pub fn unbounded() -> Self {
        Self {
            capacity: default_capacity(),
            policy: OverflowPolicy::Unbounded,
        }
    }

    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        Self { capacity, policy }
    }

    /// Effective bound, `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self.policy {
            OverflowPolicy::Unbounded => None,
            _ => Some(self.capacity),
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Enqueued after evicting the oldest envelope (DropOldest).
    Evicted(crate::domain::EnvelopeId),
    /// Not enqueued (DropNewest).
    Rejected,
}
