//! ForgeBuilder - worker の登録とワイヤリング
//!
//! # Fail-fast 設計
//! - 各 stage の `downstream()` が宣言した送信先がすべて登録済みかを build() 時にチェック
//! - 不足があれば BuildError を返す（実行時に「宛先なし」で捨てられる前に気付ける）

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use crate::app::directory::Directory;
use crate::app::runtime::Runtime;
use crate::config::ForgeConfig;
use crate::domain::WorkerId;
use crate::impls::NoopActivitySink;
use crate::mailbox::MailboxConfig;
use crate::ports::{ActivitySink, Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::worker::{StageHandler, Worker, WorkerSpec};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("no workers registered")]
    NoWorkers,

    #[error("worker {0} registered twice")]
    DuplicateWorker(WorkerId),

    #[error("stage {stage} sends to unregistered workers: {missing:?}")]
    UnknownRecipients {
        stage: WorkerId,
        missing: Vec<WorkerId>,
    },
}

/// # 使用例
/// ```ignore
/// let runtime = ForgeBuilder::new()
///     .with_activity_sink(sink)
///     .register(WorkerSpec::new("classify", "Classifier"), Arc::new(Classify::default()))
///     .build()
///     .await?;
/// ```
pub struct ForgeBuilder {
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    activity: Arc<dyn ActivitySink>,
    default_version: Option<String>,
    default_mailbox: Option<MailboxConfig>,
    stages: Vec<(WorkerSpec, Arc<dyn StageHandler>)>,
}

impl ForgeBuilder {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: None,
            activity: Arc::new(NoopActivitySink),
            default_version: None,
            default_mailbox: None,
            stages: Vec::new(),
        }
    }

    /// Version and mailbox settings from the config become defaults for
    /// workers registered through `register_stage`.
    pub fn with_config(mut self, config: &ForgeConfig) -> Self {
        self.default_version = Some(config.runtime.default_version.clone());
        self.default_mailbox = Some(config.mailbox);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to a `UlidGenerator` on the builder's clock.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_activity_sink(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    /// Register with an explicit spec.
    pub fn register(mut self, spec: WorkerSpec, handler: Arc<dyn StageHandler>) -> Self {
        self.stages.push((spec, handler));
        self
    }

    /// Register with the configured default version and mailbox.
    pub fn register_stage(
        self,
        id: impl Into<WorkerId>,
        name: impl Into<String>,
        handler: Arc<dyn StageHandler>,
    ) -> Self {
        let mut spec = WorkerSpec::new(id, name);
        if let Some(version) = &self.default_version {
            spec = spec.with_version(version.clone());
        }
        if let Some(mailbox) = self.default_mailbox {
            spec = spec.with_mailbox(mailbox);
        }
        self.register(spec, handler)
    }

    pub async fn build(self) -> Result<Runtime, BuildError> {
        if self.stages.is_empty() {
            return Err(BuildError::NoWorkers);
        }

        let mut registered = BTreeSet::new();
        for (spec, _) in &self.stages {
            if !registered.insert(spec.id.clone()) {
                return Err(BuildError::DuplicateWorker(spec.id.clone()));
            }
        }

        for (spec, handler) in &self.stages {
            let missing: Vec<WorkerId> = handler
                .downstream()
                .into_iter()
                .filter(|id| !registered.contains(id))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::UnknownRecipients {
                    stage: spec.id.clone(),
                    missing,
                });
            }
        }

        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));
        let directory = Directory::new(self.clock, ids);

        for (spec, handler) in self.stages {
            let worker = Worker::new(spec, handler, Arc::clone(&self.activity), &directory);
            directory.register(worker).await;
        }
        info!(workers = registered.len(), "forge wired");

        Ok(Runtime::new(directory))
    }
}

impl Default for ForgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
