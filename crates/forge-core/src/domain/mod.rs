//! Domain model (ids, envelope, stages, activity, metrics, idea state).

pub mod activity;
pub mod envelope;
pub mod idea;
pub mod ids;
pub mod metrics;
pub mod stage;

pub use activity::{ActivityRecord, ActivityStatus};
pub use envelope::{Action, Envelope, Payload};
pub use idea::IdeaState;
pub use ids::{CorrelationId, EnvelopeId, WorkerId};
pub use metrics::{DirectoryStatus, WorkerMetrics};
pub use stage::{Stage, actions};
