//! expand - category ごとの観点で idea を展開して visualize に渡す

use async_trait::async_trait;
use tracing::debug;

use super::ticket::{Category, IdeaTicket, put};
use crate::domain::{Envelope, IdeaState, Payload, Stage, WorkerId, actions};
use crate::worker::{HandlerError, StageHandler, WorkerContext};

const CREATIVE: &[&str] = &[
    "Artistic mediums and techniques",
    "Emotional impact and storytelling",
    "Visual or auditory elements",
    "Cultural or personal significance",
    "Collaborative possibilities",
    "Exhibition or sharing opportunities",
];

const BUSINESS: &[&str] = &[
    "Market opportunity and target customers",
    "Revenue model and pricing strategy",
    "Competitive landscape analysis",
    "Required resources and timeline",
    "Growth and scaling potential",
    "Risk factors and mitigation",
];

const PERSONAL: &[&str] = &[
    "Personal growth benefits",
    "Habit formation and routines",
    "Measurement and tracking methods",
    "Potential obstacles and solutions",
    "Community and support systems",
    "Long-term life impact",
];

const METAPHYSICAL: &[&str] = &[
    "Consciousness and awareness aspects",
    "Spiritual practices and integration",
    "Symbolic and archetypal meanings",
    "Connection to ancient wisdom",
    "Modern applications and relevance",
    "Experiential and transformative potential",
];

const GENERAL: &[&str] = &[
    "Different interpretations and applications",
    "Cross-disciplinary connections",
    "Practical implementation possibilities",
    "Creative variations and extensions",
    "Potential impact and significance",
    "Questions to explore further",
];

/// Expansion mode and the angles it explores. Utility ideas get the general set.
pub fn angles(category: Option<Category>) -> (&'static str, &'static [&'static str]) {
    match category {
        Some(Category::Creative) => ("creative", CREATIVE),
        Some(Category::Business) => ("business", BUSINESS),
        Some(Category::Personal) => ("personal", PERSONAL),
        Some(Category::Metaphysical) => ("metaphysical", METAPHYSICAL),
        Some(Category::Utility) | None => ("general", GENERAL),
    }
}

pub fn expand(content: &str, category: Option<Category>) -> String {
    let (mode, angles) = angles(category);
    let mut out = format!("{}\n\nExpansion ({mode}):", content.trim());
    for angle in angles {
        out.push_str("\n- ");
        out.push_str(angle);
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Expand;

#[async_trait]
impl StageHandler for Expand {
    async fn handle(&self, ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        match envelope.action().as_str() {
            actions::EXPAND_IDEA | actions::EXPAND_EXISTING => {}
            _ => return Err(HandlerError::UnsupportedAction(envelope.action().clone())),
        }

        let mut ticket = IdeaTicket::with_content(envelope.payload())?;
        ticket.advance(IdeaState::Processing)?;
        let (mode, _) = angles(ticket.category);
        let expanded = expand(&ticket.content, ticket.category);
        ticket.expanded_content = Some(expanded.clone());

        debug!(idea = %ticket.idea_id, mode, "idea expanded");

        ctx.send(
            Stage::Visualize,
            actions::GENERATE_VISUAL,
            ticket.to_payload(),
            None,
        )
        .await;

        let mut out = Payload::new();
        put(&mut out, "success", true);
        put(&mut out, "idea_id", &ticket.idea_id);
        put(&mut out, "state", ticket.state());
        put(&mut out, "mode", mode);
        put(&mut out, "expansions_count", 1);
        put(&mut out, "expanded_content", expanded);
        Ok(out)
    }

    fn downstream(&self) -> Vec<WorkerId> {
        vec![Stage::Visualize.id()]
    }
}
