//! visualize - 画像生成用の prompt と style を組み立てて propose に渡す
//!
//! 画像そのものは生成しない。primary / alternative / abstract の 3 案を結果に載せる。

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::ticket::{Category, IdeaTicket, put};
use crate::domain::{Envelope, IdeaState, Payload, Stage, WorkerId, actions};
use crate::worker::{HandlerError, StageHandler, WorkerContext};

/// Longest subject taken from the idea text.
const SUBJECT_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisualStyle {
    pub name: &'static str,
    pub style: &'static str,
    pub negative: &'static str,
    pub sampler: &'static str,
    pub steps: u32,
    pub cfg_scale: f64,
}

const CREATIVE: VisualStyle = VisualStyle {
    name: "creative",
    style: "artistic, abstract, vibrant colors, creative composition",
    negative: "boring, conventional, monochrome",
    sampler: "euler",
    steps: 25,
    cfg_scale: 7.5,
};

const BUSINESS: VisualStyle = VisualStyle {
    name: "business",
    style: "professional, modern, clean, corporate, sleek design",
    negative: "chaotic, unprofessional, messy",
    sampler: "dpmpp_2m",
    steps: 20,
    cfg_scale: 7.0,
};

const TECHNICAL: VisualStyle = VisualStyle {
    name: "technical",
    style: "technical diagram, blueprint, schematic, clean lines, precise",
    negative: "artistic, abstract, imprecise",
    sampler: "euler",
    steps: 20,
    cfg_scale: 8.0,
};

const PERSONAL: VisualStyle = VisualStyle {
    name: "personal",
    style: "warm, personal, lifestyle, comfortable, natural lighting",
    negative: "cold, impersonal, harsh",
    sampler: "dpmpp_2m",
    steps: 25,
    cfg_scale: 7.0,
};

const METAPHYSICAL: VisualStyle = VisualStyle {
    name: "metaphysical",
    style: "ethereal, mystical, cosmic, spiritual, otherworldly",
    negative: "mundane, ordinary, earthly",
    sampler: "euler",
    steps: 30,
    cfg_scale: 8.5,
};

pub fn style_for(category: Option<Category>) -> VisualStyle {
    match category {
        Some(Category::Business) => BUSINESS,
        Some(Category::Utility) => TECHNICAL,
        Some(Category::Personal) => PERSONAL,
        Some(Category::Metaphysical) => METAPHYSICAL,
        Some(Category::Creative) | None => CREATIVE,
    }
}

/// Second style for variety.
pub fn alternative_for(category: Option<Category>) -> VisualStyle {
    match category {
        Some(Category::Creative) => PERSONAL,
        Some(Category::Business) => TECHNICAL,
        Some(Category::Utility) => BUSINESS,
        Some(Category::Personal) | Some(Category::Metaphysical) | None => CREATIVE,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualPlan {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub prompt: String,
    pub style: VisualStyle,
}

fn subject(text: &str) -> String {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    first.chars().take(SUBJECT_CHARS).collect()
}

pub fn plan(ticket: &IdeaTicket) -> Vec<VisualPlan> {
    let source = if ticket.content.trim().is_empty() {
        ticket.expanded_content.as_deref().unwrap_or("")
    } else {
        ticket.content.as_str()
    };
    let subject = subject(source);

    let primary = style_for(ticket.category);
    let alternative = alternative_for(ticket.category);
    vec![
        VisualPlan {
            kind: "primary",
            prompt: format!("{subject}, {}", primary.style),
            style: primary,
        },
        VisualPlan {
            kind: "alternative",
            prompt: format!("{subject}, {}", alternative.style),
            style: alternative,
        },
        VisualPlan {
            kind: "abstract",
            prompt: format!("abstract interpretation of {subject}, shapes, colors and flow"),
            style: CREATIVE,
        },
    ]
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Visualize;

#[async_trait]
impl StageHandler for Visualize {
    async fn handle(&self, ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        if envelope.action().as_str() != actions::GENERATE_VISUAL {
            return Err(HandlerError::UnsupportedAction(envelope.action().clone()));
        }

        let mut ticket = IdeaTicket::from_payload(envelope.payload())?;
        if ticket.content.trim().is_empty()
            && ticket
                .expanded_content
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
        {
            return Err(HandlerError::MissingField("content"));
        }
        ticket.advance(IdeaState::Processing)?;
        let plans = plan(&ticket);

        debug!(idea = %ticket.idea_id, visuals = plans.len(), "visual prompts ready");

        ctx.send(
            Stage::Propose,
            actions::GENERATE_PROPOSAL,
            ticket.to_payload(),
            None,
        )
        .await;

        let mut out = Payload::new();
        put(&mut out, "success", true);
        put(&mut out, "idea_id", &ticket.idea_id);
        put(&mut out, "state", ticket.state());
        put(&mut out, "visualizations_count", plans.len());
        put(&mut out, "visualizations", &plans);
        Ok(out)
    }

    fn downstream(&self) -> Vec<WorkerId> {
        vec![Stage::Propose.id()]
    }
}
