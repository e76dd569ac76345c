//! review - 優先度の高い proposal を見直して pipeline に戻すか決める
//!
//! - relevance（urgency / novelty / viability の平均）が高ければ classify に `reclassify`
//! - そうでなければ expand に `expand_existing`
//! - `resurrections` が上限に達していたら何も送らず hold
//!
//! 上限があるので review → classify/expand → ... → review の循環は必ず止まる。

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::ticket::{IdeaTicket, put};
use crate::config::PipelineConfig;
use crate::domain::{Envelope, IdeaState, Payload, Stage, WorkerId, actions};
use crate::worker::{HandlerError, StageHandler, WorkerContext};

const NEUTRAL_SCORE: f64 = 50.0;
/// Relevance at or above this goes back through classify.
const RESURRECT_RELEVANCE: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Resurrect,
    Expand,
    Hold,
}

pub fn relevance(ticket: &IdeaTicket) -> f64 {
    let scores = [
        ticket.urgency_score.unwrap_or(NEUTRAL_SCORE),
        ticket.novelty_score.unwrap_or(NEUTRAL_SCORE),
        ticket.viability_score.unwrap_or(NEUTRAL_SCORE),
    ];
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 10.0).round() / 10.0
}

#[derive(Debug, Clone)]
pub struct Review {
    max_resurrections: u32,
}

impl Review {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_resurrections: config.max_resurrections,
        }
    }

    pub fn recommend(&self, ticket: &IdeaTicket) -> Recommendation {
        if ticket.resurrections >= self.max_resurrections {
            Recommendation::Hold
        } else if relevance(ticket) >= RESURRECT_RELEVANCE {
            Recommendation::Resurrect
        } else {
            Recommendation::Expand
        }
    }
}

impl Default for Review {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

#[async_trait]
impl StageHandler for Review {
    async fn handle(&self, ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        if envelope.action().as_str() != actions::PRIORITY_REVIEW {
            return Err(HandlerError::UnsupportedAction(envelope.action().clone()));
        }

        let mut ticket = IdeaTicket::from_payload(envelope.payload())?;
        ticket.advance(IdeaState::Processing)?;
        let proposal_id = envelope
            .payload()
            .get("proposal_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let recommendation = self.recommend(&ticket);
        let relevance = relevance(&ticket);

        info!(
            idea = %ticket.idea_id,
            ?recommendation,
            relevance,
            resurrections = ticket.resurrections,
            "idea reviewed"
        );

        let next = match recommendation {
            Recommendation::Resurrect => Some((Stage::Classify, actions::RECLASSIFY)),
            Recommendation::Expand => Some((Stage::Expand, actions::EXPAND_EXISTING)),
            Recommendation::Hold => None,
        };
        if let Some((stage, action)) = next {
            ticket.resurrections += 1;
            let mut payload = ticket.to_payload();
            put(&mut payload, "reason", "review_resurrection");
            ctx.send(stage, action, payload, None).await;
        } else {
            ticket.advance(IdeaState::Completed)?;
        }

        let mut out = Payload::new();
        put(&mut out, "success", true);
        put(&mut out, "idea_id", &ticket.idea_id);
        put(&mut out, "state", ticket.state());
        put(&mut out, "proposal_id", proposal_id);
        put(&mut out, "recommendation", recommendation);
        put(&mut out, "relevance_score", relevance);
        put(&mut out, "resurrections", ticket.resurrections);
        Ok(out)
    }

    fn downstream(&self) -> Vec<WorkerId> {
        vec![Stage::Classify.id(), Stage::Expand.id()]
    }
}
