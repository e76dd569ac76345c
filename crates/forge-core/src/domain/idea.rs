//! IdeaState - idea のライフサイクル
//!
//! core は強制しない。idea の payload に載って運ばれ、各 stage が `IdeaTicket::advance` で遷移させる。

use serde::{Deserialize, Serialize};

/// State transitions:
/// - Pending -> Processing -> Completed | Failed
/// - any -> Archived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaState {
    Pending,
    Processing,
    Completed,
    Failed,
    Archived,
}

impl IdeaState {
    pub fn can_transition_to(self, next: IdeaState) -> bool {
        use IdeaState::*;
        match (self, next) {
            (_, Archived) => true,
            (Pending, Processing) => true,
            (Processing, Processing) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            // resurrection: 完了済みの idea が再び pipeline に入る
            (Completed, Processing) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, IdeaState::Archived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdeaState::Pending => "pending",
            IdeaState::Processing => "processing",
            IdeaState::Completed => "completed",
            IdeaState::Failed => "failed",
            IdeaState::Archived => "archived",
        }
    }
}

impl std::fmt::Display for IdeaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
