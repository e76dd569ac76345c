//! classify - キーワードで category / urgency / novelty / tags を決める
//!
//! 見込みがある idea だけ expand に送る:
//! `urgency > expand_urgency_threshold || novelty > expand_novelty_threshold || tags に urgent`

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::ticket::{Category, IdeaTicket, any_hit, hits, put};
use crate::config::PipelineConfig;
use crate::domain::{Envelope, IdeaState, Payload, Stage, WorkerId, actions};
use crate::worker::{HandlerError, StageHandler, WorkerContext};

/// Table order breaks ties between categories.
const CATEGORIES: &[(Category, &[&str])] = &[
    (Category::Creative, &["art", "design", "story", "music", "creative", "visual"]),
    (Category::Business, &["business", "startup", "money", "revenue", "product", "market"]),
    (Category::Personal, &["personal", "habit", "routine", "self", "improvement"]),
    (Category::Metaphysical, &["spiritual", "consciousness", "awakening", "meditation", "energy"]),
    (Category::Utility, &["app", "tool", "utility", "helper", "automation", "system"]),
];

const HIGH_URGENCY: &[&str] = &["urgent", "asap", "critical", "important", "emergency"];
const MEDIUM_URGENCY: &[&str] = &["soon", "needed", "should", "priority"];
const EXCITEMENT: &[&str] = &[
    "amazing",
    "brilliant",
    "genius",
    "perfect",
    "incredible",
    "holy shit",
    "this is it",
];
const NOVELTY: &[&str] = &["new", "innovative", "never", "first", "unique", "original"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub urgency_score: f64,
    pub novelty_score: f64,
    pub tags: Vec<String>,
}

impl Classification {
    pub fn of(content: &str) -> Self {
        let lower = content.to_lowercase();

        let mut category = Category::Utility;
        let mut best = 0;
        for (cat, keywords) in CATEGORIES {
            let n = hits(&lower, keywords);
            if n > best {
                best = n;
                category = *cat;
            }
        }

        let urgency_score = (50.0
            + 20.0 * hits(&lower, HIGH_URGENCY) as f64
            + 10.0 * hits(&lower, MEDIUM_URGENCY) as f64
            + 25.0 * hits(&lower, EXCITEMENT) as f64)
            .min(100.0);
        let novelty_score = (50.0 + 10.0 * hits(&lower, NOVELTY) as f64).min(100.0);

        let mut tags: Vec<String> = CATEGORIES
            .iter()
            .filter(|(_, keywords)| any_hit(&lower, keywords))
            .map(|(cat, _)| cat.as_str().to_string())
            .collect();
        if urgency_score > 80.0 {
            tags.push("urgent".to_string());
        } else if urgency_score > 65.0 {
            tags.push("high-priority".to_string());
        }

        Self {
            category,
            urgency_score,
            novelty_score,
            tags,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classify {
    urgency_threshold: f64,
    novelty_threshold: f64,
}

impl Classify {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            urgency_threshold: f64::from(config.expand_urgency_threshold),
            novelty_threshold: f64::from(config.expand_novelty_threshold),
        }
    }

    pub fn should_expand(&self, c: &Classification) -> bool {
        c.urgency_score > self.urgency_threshold
            || c.novelty_score > self.novelty_threshold
            || c.tags.iter().any(|t| t == "urgent")
    }
}

impl Default for Classify {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

#[async_trait]
impl StageHandler for Classify {
    async fn handle(&self, ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        match envelope.action().as_str() {
            actions::CLASSIFY_IDEA | actions::RECLASSIFY => {}
            _ => return Err(HandlerError::UnsupportedAction(envelope.action().clone())),
        }

        let mut ticket = IdeaTicket::with_content(envelope.payload())?;
        ticket.advance(IdeaState::Processing)?;
        let classification = Classification::of(&ticket.content);
        let expand = self.should_expand(&classification);

        ticket.category = Some(classification.category);
        ticket.urgency_score = Some(classification.urgency_score);
        ticket.novelty_score = Some(classification.novelty_score);
        for tag in &classification.tags {
            ticket.add_tag(tag.clone());
        }

        debug!(
            idea = %ticket.idea_id,
            category = %classification.category,
            urgency = classification.urgency_score,
            novelty = classification.novelty_score,
            expand,
            "idea classified"
        );

        if expand {
            ctx.send(Stage::Expand, actions::EXPAND_IDEA, ticket.to_payload(), None)
                .await;
        } else {
            ticket.advance(IdeaState::Completed)?;
        }

        let mut out = Payload::new();
        put(&mut out, "success", true);
        put(&mut out, "idea_id", &ticket.idea_id);
        put(&mut out, "state", ticket.state());
        put(&mut out, "classification", &classification);
        put(&mut out, "should_expand", expand);
        Ok(out)
    }

    fn downstream(&self) -> Vec<WorkerId> {
        vec![Stage::Expand.id()]
    }
}
