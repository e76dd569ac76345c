//! IdeaTicket - stage 間で受け渡す idea の状態
//!
//! 永続化層がないので、下流の stage が必要とするもの（scores, tags, 展開結果,
//! resurrection 回数）はすべて payload に載せて運ぶ。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{IdeaState, Payload};
use crate::worker::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Creative,
    Business,
    Personal,
    Metaphysical,
    Utility,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Creative => "creative",
            Category::Business => "business",
            Category::Personal => "personal",
            Category::Metaphysical => "metaphysical",
            Category::Utility => "utility",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdeaTicket {
    #[serde(default, alias = "ideaId")]
    pub idea_id: String,

    #[serde(default, alias = "original_content", skip_serializing_if = "String::is_empty")]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novelty_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viability_score: Option<f64>,

    /// Absent means the idea has not entered the pipeline yet (pending).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<IdeaState>,

    /// How many times review has sent this idea back into the pipeline.
    #[serde(default)]
    pub resurrections: u32,
}

impl IdeaTicket {
    pub fn new(idea_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            idea_id: idea_id.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Read a ticket from an incoming payload. `idea_id` is always required.
    pub fn from_payload(payload: &Payload) -> Result<Self, HandlerError> {
        let ticket: IdeaTicket = serde_json::from_value(Value::Object(payload.clone())).map_err(
            |e| HandlerError::InvalidField {
                field: "payload",
                reason: e.to_string(),
            },
        )?;
        if ticket.idea_id.trim().is_empty() {
            return Err(HandlerError::MissingField("idea_id"));
        }
        Ok(ticket)
    }

    /// Like `from_payload`, but `content` must be non-empty too.
    pub fn with_content(payload: &Payload) -> Result<Self, HandlerError> {
        let ticket = Self::from_payload(payload)?;
        if ticket.content.trim().is_empty() {
            return Err(HandlerError::MissingField("content"));
        }
        Ok(ticket)
    }

    pub fn to_payload(&self) -> Payload {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }

    pub fn state(&self) -> IdeaState {
        self.state.unwrap_or(IdeaState::Pending)
    }

    /// Move the idea to `next`. Archived ideas and illegal transitions are rejected.
    pub fn advance(&mut self, next: IdeaState) -> Result<(), HandlerError> {
        let current = self.state();
        if current.is_terminal() {
            return Err(HandlerError::InvalidField {
                field: "state",
                reason: format!("idea {} is {current}", self.idea_id),
            });
        }
        if !current.can_transition_to(next) {
            return Err(HandlerError::InvalidField {
                field: "state",
                reason: format!("cannot move idea {} from {current} to {next}", self.idea_id),
            });
        }
        self.state = Some(next);
        Ok(())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.has_tag(&tag) {
            self.tags.push(tag);
        }
    }
}

/// Number of keywords that occur in `text` (already lowercased).
pub(crate) fn hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

pub(crate) fn any_hit(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Insert a value into a result payload, skipping values that fail to serialize.
pub(crate) fn put(payload: &mut Payload, key: &str, value: impl Serialize) {
    if let Ok(v) = serde_json::to_value(value) {
        payload.insert(key.to_string(), v);
    }
}
