//! capture - 生の入力（text / voice / dream / image）を idea にする
//!
//! 成功したら必ず classify に `classify_idea` を送る。

use async_trait::async_trait;
use tracing::debug;

use super::ticket::{IdeaTicket, any_hit, hits, put};
use crate::domain::{Envelope, IdeaState, Payload, Stage, WorkerId, actions};
use crate::worker::{HandlerError, StageHandler, WorkerContext};

const BASE_URGENCY: f64 = 50.0;
const DREAM_URGENCY: f64 = 30.0;

const URGENT_KEYWORDS: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "emergency",
    "critical",
    "important",
];
const EXCITEMENT_KEYWORDS: &[&str] = &[
    "amazing",
    "brilliant",
    "genius",
    "perfect",
    "incredible",
    "holy shit",
];

const AUTO_TAGS: &[(&str, &[&str])] = &[
    ("app", &["app", "application", "mobile", "software"]),
    ("business", &["business", "startup", "money", "revenue", "product"]),
    ("creative", &["art", "design", "creative", "story", "music"]),
    ("tech", &["ai", "tech", "code", "programming", "algorithm"]),
    ("spiritual", &["spiritual", "meditation", "consciousness", "awakening"]),
    ("dream", &["dream", "sleep", "lucid", "nightmare"]),
    ("urgent", &["urgent", "asap", "important", "critical"]),
];

const DREAM_SYMBOLS: &[&str] = &["spirit", "vision", "prophecy", "symbol", "message"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Text,
    Voice,
    Dream,
    Image,
}

impl InputKind {
    fn parse(s: &str) -> Result<Self, HandlerError> {
        match s {
            "text" => Ok(InputKind::Text),
            "voice" => Ok(InputKind::Voice),
            "dream" => Ok(InputKind::Dream),
            "image" => Ok(InputKind::Image),
            other => Err(HandlerError::UnsupportedInput(other.to_string())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Voice => "voice",
            InputKind::Dream => "dream",
            InputKind::Image => "image",
        }
    }
}

/// Initial urgency from the caller's hint and the wording.
///
/// `50 × hint × 1.3^(urgent keywords) × 1.2^(excitement keywords)`, capped at 100.
pub fn urgency_score(content: &str, hint: &str) -> f64 {
    let lower = content.to_lowercase();
    let hint = match hint {
        "low" => 0.5,
        "high" => 1.5,
        "urgent" => 2.0,
        "emergency" => 3.0,
        _ => 1.0,
    };
    let multiplier = hint
        * 1.3_f64.powi(hits(&lower, URGENT_KEYWORDS) as i32)
        * 1.2_f64.powi(hits(&lower, EXCITEMENT_KEYWORDS) as i32);
    (BASE_URGENCY * multiplier).min(100.0)
}

pub fn auto_tags(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    AUTO_TAGS
        .iter()
        .filter(|(_, keywords)| any_hit(&lower, keywords))
        .map(|(tag, _)| (*tag).to_string())
        .collect()
}

fn text<'a>(payload: &'a Payload, field: &'static str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn require<'a>(payload: &'a Payload, field: &'static str) -> Result<&'a str, HandlerError> {
    text(payload, field).ok_or(HandlerError::MissingField(field))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Capture;

impl Capture {
    fn ticket(&self, kind: InputKind, idea_id: String, p: &Payload) -> Result<IdeaTicket, HandlerError> {
        let hint = text(p, "urgency").unwrap_or("normal");

        let ticket = match kind {
            InputKind::Text | InputKind::Voice => {
                let field = if kind == InputKind::Text { "content" } else { "transcript" };
                let content = require(p, field)?;
                let mut t = IdeaTicket::new(idea_id, content);
                t.urgency_score = Some(urgency_score(content, hint));
                t.tags = auto_tags(content);
                t
            }
            InputKind::Dream => {
                let content = require(p, "content")?;
                let dream_type = text(p, "dream_type").unwrap_or("regular");
                let mut t = IdeaTicket::new(idea_id, content);
                t.urgency_score = Some(DREAM_URGENCY);
                t.add_tag("dream");
                if dream_type != "regular" {
                    t.add_tag(dream_type);
                }
                if any_hit(&content.to_lowercase(), DREAM_SYMBOLS) {
                    t.add_tag("metaphysical");
                }
                t
            }
            InputKind::Image => {
                let image_path = require(p, "image_path")?;
                let content = match text(p, "description") {
                    Some(d) => d.to_string(),
                    None => {
                        let file = std::path::Path::new(image_path)
                            .file_name()
                            .and_then(|f| f.to_str())
                            .unwrap_or(image_path);
                        format!("Image uploaded: {file}")
                    }
                };
                let mut t = IdeaTicket::new(idea_id, content);
                t.add_tag("image");
                t
            }
        };
        Ok(ticket)
    }
}

#[async_trait]
impl StageHandler for Capture {
    async fn handle(&self, ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        if envelope.action().as_str() != actions::CAPTURE_INPUT {
            return Err(HandlerError::UnsupportedAction(envelope.action().clone()));
        }

        let p = envelope.payload();
        let kind = InputKind::parse(require(p, "type")?)?;
        let idea_id = match envelope.idea_id().map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => ctx.new_ulid().to_string(),
        };

        let mut ticket = self.ticket(kind, idea_id, p)?;
        ticket.advance(IdeaState::Processing)?;
        debug!(idea = %ticket.idea_id, source = kind.as_str(), "idea captured");

        ctx.send(
            Stage::Classify,
            actions::CLASSIFY_IDEA,
            ticket.to_payload(),
            None,
        )
        .await;

        let mut out = Payload::new();
        put(&mut out, "success", true);
        put(&mut out, "idea_id", &ticket.idea_id);
        put(&mut out, "state", ticket.state());
        put(&mut out, "source", kind.as_str());
        put(&mut out, "content", &ticket.content);
        put(&mut out, "urgency_score", ticket.urgency_score);
        put(&mut out, "tags", &ticket.tags);
        Ok(out)
    }

    fn downstream(&self) -> Vec<WorkerId> {
        vec![Stage::Classify.id()]
    }
}
