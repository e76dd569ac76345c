//! Stages - idea pipeline の各段
//!
//! capture → classify → expand → visualize → propose → review
//! （review は classify / expand に戻すことがある）
//!
//! どの stage も rule-based。外部の AI サービスは呼ばない。

pub mod capture;
pub mod classify;
pub mod expand;
pub mod propose;
pub mod review;
pub mod ticket;
pub mod visualize;

pub use capture::Capture;
pub use classify::{Classification, Classify};
pub use expand::Expand;
pub use propose::{ProposalStatus, Propose, Viability};
pub use review::{Recommendation, Review};
pub use ticket::{Category, IdeaTicket};
pub use visualize::Visualize;

use std::sync::Arc;

use crate::app::ForgeBuilder;
use crate::config::PipelineConfig;
use crate::domain::Stage;
use crate::worker::StageHandler;

pub fn handler_for(stage: Stage, config: &PipelineConfig) -> Arc<dyn StageHandler> {
    match stage {
        Stage::Capture => Arc::new(Capture),
        Stage::Classify => Arc::new(Classify::new(config)),
        Stage::Expand => Arc::new(Expand),
        Stage::Visualize => Arc::new(Visualize),
        Stage::Propose => Arc::new(Propose::new(config)),
        Stage::Review => Arc::new(Review::new(config)),
    }
}

/// Register all six stages under their stage ids.
pub fn register_pipeline(mut builder: ForgeBuilder, config: &PipelineConfig) -> ForgeBuilder {
    for stage in Stage::ALL {
        builder = builder.register_stage(stage, stage.display_name(), handler_for(stage, config));
    }
    builder
}
