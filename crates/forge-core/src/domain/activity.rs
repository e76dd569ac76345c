//! Activity records emitted for every handled envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::{Action, Envelope, Payload};
use super::ids::{EnvelopeId, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Started,
    Completed,
    Failed,
}

/// One append-only entry of the activity log.
///
/// A handled envelope produces exactly two of these: `Started`, then
/// `Completed` or `Failed` (with `completed_at`/`duration_ms` set).
/// A completed record keeps the handler's result in `output` when it is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub worker_id: WorkerId,
    pub envelope_id: EnvelopeId,
    pub action: Action,
    pub status: ActivityStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idea_id: Option<String>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
}

impl ActivityRecord {
    pub fn started(worker_id: WorkerId, envelope: &Envelope, started_at: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            envelope_id: envelope.id().clone(),
            action: envelope.action().clone(),
            status: ActivityStatus::Started,
            idea_id: envelope.idea_id().map(str::to_string),
            started_at,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            output: None,
        }
    }

    pub fn completed(self, completed_at: DateTime<Utc>, output: Payload) -> Self {
        let mut rec = self.finish(ActivityStatus::Completed, completed_at, None);
        rec.output = (!output.is_empty()).then_some(output);
        rec
    }

    pub fn failed(self, completed_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        self.finish(ActivityStatus::Failed, completed_at, Some(error.into()))
    }

    fn finish(
        mut self,
        status: ActivityStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Self {
        self.status = status;
        self.duration_ms = Some((completed_at - self.started_at).num_milliseconds().max(0));
        self.completed_at = Some(completed_at);
        self.error_message = error_message;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use ulid::Ulid;

    fn envelope() -> Envelope {
        let payload: Payload = json!({ "idea_id": "42" }).as_object().cloned().unwrap();
        Envelope::new(
            EnvelopeId::new(WorkerId::new("capture"), Ulid::new()),
            WorkerId::new("classify"),
            Action::new("classify_idea"),
            payload,
            Utc::now(),
        )
    }

    #[test]
    fn finished_record_carries_duration() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let started = ActivityRecord::started(WorkerId::new("classify"), &envelope(), t0);
        assert_eq!(started.status, ActivityStatus::Started);
        assert_eq!(started.idea_id.as_deref(), Some("42"));

        let output: Payload = json!({ "success": true }).as_object().cloned().unwrap();
        let done = started.clone().completed(t0 + Duration::milliseconds(250), output.clone());
        assert_eq!(done.status, ActivityStatus::Completed);
        assert_eq!(done.duration_ms, Some(250));
        assert!(done.error_message.is_none());
        assert_eq!(done.output, Some(output));

        let empty = started.completed(t0, Payload::new());
        assert!(empty.output.is_none());
        assert!(!serde_json::to_string(&empty).unwrap().contains("output"));
    }

    #[test]
    fn failed_record_keeps_error_text() {
        let t0 = Utc::now();
        let rec = ActivityRecord::started(WorkerId::new("classify"), &envelope(), t0)
            .failed(t0, "missing field `content`");
        assert_eq!(rec.status, ActivityStatus::Failed);
        assert_eq!(rec.error_message.as_deref(), Some("missing field `content`"));
        assert_eq!(rec.duration_ms, Some(0));
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&ActivityStatus::Completed).unwrap();
        assert_eq!(s, "\"completed\"");
    }
}
