//! Stage - pipeline の各段を表す閉じた enum
//!
//! 受信者名の typo を型で潰すために、既知の stage は enum で持つ。
//! 動的な stage は `WorkerId` を直接使えばよい。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Capture,
    Classify,
    Expand,
    Visualize,
    Propose,
    Review,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Capture,
        Stage::Classify,
        Stage::Expand,
        Stage::Visualize,
        Stage::Propose,
        Stage::Review,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Capture => "capture",
            Stage::Classify => "classify",
            Stage::Expand => "expand",
            Stage::Visualize => "visualize",
            Stage::Propose => "propose",
            Stage::Review => "review",
        }
    }

    pub fn id(self) -> WorkerId {
        WorkerId::new(self.as_str())
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Capture => "Capture Agent",
            Stage::Classify => "Analysis Agent",
            Stage::Expand => "Expansion Agent",
            Stage::Visualize => "Visual Agent",
            Stage::Propose => "Proposal Agent",
            Stage::Review => "Review Agent",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Stage> for WorkerId {
    fn from(stage: Stage) -> Self {
        stage.id()
    }
}

/// Action verbs used on the pipeline edges.
pub mod actions {
    pub const CAPTURE_INPUT: &str = "capture_input";
    pub const CLASSIFY_IDEA: &str = "classify_idea";
    pub const RECLASSIFY: &str = "reclassify";
    pub const EXPAND_IDEA: &str = "expand_idea";
    pub const EXPAND_EXISTING: &str = "expand_existing";
    pub const GENERATE_VISUAL: &str = "generate_visual";
    pub const GENERATE_PROPOSAL: &str = "generate_proposal";
    pub const PRIORITY_REVIEW: &str = "priority_review";
}
