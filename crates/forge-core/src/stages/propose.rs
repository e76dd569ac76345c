//! propose - viability を見積もって proposal を作る
//!
//! viability = 0.4 × urgency + 0.4 × novelty + 0.2 × depth
//! （depth は展開結果の語数 × 2、上限 100）。
//! `low_viability_threshold` 未満は `low_viability`、
//! `priority_review_threshold` 以上なら review に `priority_review` を送る。

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::ticket::{IdeaTicket, put};
use crate::config::PipelineConfig;
use crate::domain::{Envelope, IdeaState, Payload, Stage, WorkerId, actions};
use crate::worker::{HandlerError, StageHandler, WorkerContext};

/// Score assumed for a dimension classify did not fill in.
const NEUTRAL_SCORE: f64 = 50.0;
const TITLE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    LowViability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Viability {
    pub depth_score: f64,
    pub viability_score: f64,
    pub priority_score: f64,
    pub estimated_effort: Effort,
}

impl Viability {
    pub fn assess(ticket: &IdeaTicket) -> Self {
        let urgency = ticket.urgency_score.unwrap_or(NEUTRAL_SCORE);
        let novelty = ticket.novelty_score.unwrap_or(NEUTRAL_SCORE);
        let words = ticket
            .expanded_content
            .as_deref()
            .unwrap_or(&ticket.content)
            .split_whitespace()
            .count();

        let depth_score = (words as f64 * 2.0).min(100.0);
        let viability_score = round1(0.4 * urgency + 0.4 * novelty + 0.2 * depth_score);
        let priority_score = round1((viability_score + urgency) / 2.0);
        let estimated_effort = match words {
            0..30 => Effort::Low,
            30..80 => Effort::Medium,
            _ => Effort::High,
        };

        Self {
            depth_score,
            viability_score,
            priority_score,
            estimated_effort,
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone)]
pub struct Propose {
    low_viability: f64,
    priority_review: f64,
}

impl Propose {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            low_viability: f64::from(config.low_viability_threshold),
            priority_review: f64::from(config.priority_review_threshold),
        }
    }

    pub fn status(&self, v: &Viability) -> ProposalStatus {
        if v.viability_score < self.low_viability {
            ProposalStatus::LowViability
        } else {
            ProposalStatus::Pending
        }
    }
}

impl Default for Propose {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}

#[async_trait]
impl StageHandler for Propose {
    async fn handle(&self, ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        if envelope.action().as_str() != actions::GENERATE_PROPOSAL {
            return Err(HandlerError::UnsupportedAction(envelope.action().clone()));
        }

        let mut ticket = IdeaTicket::from_payload(envelope.payload())?;
        ticket.advance(IdeaState::Processing)?;
        let viability = Viability::assess(&ticket);
        let status = self.status(&viability);
        let proposal_id = ctx.new_ulid().to_string();
        ticket.viability_score = Some(viability.viability_score);

        debug!(
            idea = %ticket.idea_id,
            proposal = %proposal_id,
            viability = viability.viability_score,
            ?status,
            "proposal generated"
        );

        let review_requested = viability.viability_score >= self.priority_review;
        if review_requested {
            info!(idea = %ticket.idea_id, proposal = %proposal_id, "high priority review requested");
            let mut review = ticket.to_payload();
            put(&mut review, "proposal_id", &proposal_id);
            put(&mut review, "priority", "high");
            ctx.send(Stage::Review, actions::PRIORITY_REVIEW, review, None)
                .await;
        } else {
            ticket.advance(IdeaState::Completed)?;
        }

        let title: String = ticket.content.chars().take(TITLE_CHARS).collect();
        let mut out = Payload::new();
        put(&mut out, "success", true);
        put(&mut out, "idea_id", &ticket.idea_id);
        put(&mut out, "state", ticket.state());
        put(&mut out, "proposal_id", &proposal_id);
        put(&mut out, "title", format!("Proposal for: {title}"));
        put(&mut out, "status", status);
        put(&mut out, "viability", &viability);
        Ok(out)
    }

    fn downstream(&self) -> Vec<WorkerId> {
        vec![Stage::Review.id()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    use crate::testkit::{Harness, payload};

    fn ticket(urgency: f64, novelty: f64, words: usize) -> IdeaTicket {
        let mut t = IdeaTicket::new("1", "idea");
        t.urgency_score = Some(urgency);
        t.novelty_score = Some(novelty);
        t.expanded_content = Some(vec!["word"; words].join(" "));
        t
    }

    #[rstest]
    // 40 + 32 + 0.2 × 72
    #[case(100.0, 80.0, 36, 86.4, Effort::Medium)]
    #[case(50.0, 50.0, 10, 44.0, Effort::Low)]
    // depth は 100 で頭打ち
    #[case(50.0, 50.0, 500, 60.0, Effort::High)]
    fn viability_weights(
        #[case] urgency: f64,
        #[case] novelty: f64,
        #[case] words: usize,
        #[case] expected: f64,
        #[case] effort: Effort,
    ) {
        let v = Viability::assess(&ticket(urgency, novelty, words));
        assert!((v.viability_score - expected).abs() < 1e-9, "{}", v.viability_score);
        assert_eq!(v.estimated_effort, effort);
    }

    #[test]
    fn missing_scores_are_neutral() {
        let t = IdeaTicket::new("1", "");
        let v = Viability::assess(&t);
        assert_eq!(v.depth_score, 0.0);
        assert_eq!(v.viability_score, 40.0);
        assert_eq!(Propose::default().status(&v), ProposalStatus::LowViability);
    }

    #[tokio::test]
    async fn high_viability_requests_priority_review() {
        let h = Harness::new(Stage::Propose, Arc::new(Propose::default())).await;
        let mut input = ticket(100.0, 80.0, 36).to_payload();
        input.insert("resurrections".into(), json!(1));

        let out = h.call(actions::GENERATE_PROPOSAL, input).await.unwrap();
        assert_eq!(out.get("status"), Some(&json!("pending")));
        assert_eq!(out.get("state"), Some(&json!("processing")));
        h.settle().await;

        let seen = h.recorder(Stage::Review).seen().await;
        assert_eq!(seen.len(), 1);
        let review = seen[0].payload();
        assert_eq!(seen[0].action().as_str(), actions::PRIORITY_REVIEW);
        assert_eq!(review.get("priority"), Some(&json!("high")));
        assert_eq!(review.get("proposal_id"), out.get("proposal_id"));
        assert_eq!(review.get("viability_score"), Some(&json!(86.4)));
        assert_eq!(review.get("resurrections"), Some(&json!(1)));
    }

    #[rstest]
    #[case(50.0, 50.0, 10, "low_viability")]
    #[case(70.0, 70.0, 20, "pending")]
    #[tokio::test]
    async fn ordinary_proposals_stop_here(
        #[case] urgency: f64,
        #[case] novelty: f64,
        #[case] words: usize,
        #[case] status: &str,
    ) {
        let h = Harness::new(Stage::Propose, Arc::new(Propose::default())).await;
        let out = h
            .call(actions::GENERATE_PROPOSAL, ticket(urgency, novelty, words).to_payload())
            .await
            .unwrap();
        assert_eq!(out.get("status"), Some(&json!(status)));
        assert_eq!(out.get("state"), Some(&json!("completed")));
        h.settle().await;
        assert!(h.recorder(Stage::Review).seen().await.is_empty());
    }

    #[tokio::test]
    async fn title_is_truncated() {
        let h = Harness::new(Stage::Propose, Arc::new(Propose::default())).await;
        let long = "x".repeat(300);
        let out = h
            .call(actions::GENERATE_PROPOSAL, payload(json!({"idea_id": "1", "content": long})))
            .await
            .unwrap();
        let title = out.get("title").and_then(|v| v.as_str()).unwrap();
        assert_eq!(title.len(), "Proposal for: ".len() + 100);
    }
}
