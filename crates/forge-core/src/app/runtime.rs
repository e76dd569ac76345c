//! Runtime - 登録済み worker の loop をまとめて管理する
//!
//! - `start()` で全 worker の loop を spawn
//! - `deactivate()` / `activate()` で個別に止める・再開する
//! - `shutdown_and_join()` で全 worker を止めて終了を待つ

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app::directory::{Directory, RouteOutcome};
use crate::domain::{Action, DirectoryStatus, Payload, WorkerId};
use crate::error::ForgeError;

/// How often `wait_idle` samples the workers.
const IDLE_POLL: Duration = Duration::from_millis(10);

pub struct Runtime {
    directory: Arc<Directory>,
    joins: Mutex<HashMap<WorkerId, JoinHandle<()>>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self {
            directory,
            joins: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Spawn the loop of every active worker that isn't running yet.
    /// Returns how many loops were started.
    pub async fn start(&self) -> usize {
        let mut joins = self.joins.lock().await;
        let mut started = 0;
        for worker in self.directory.workers().await {
            if !worker.is_active() {
                continue;
            }
            if let Some(join) = worker.spawn() {
                joins.insert(worker.id().clone(), join);
                started += 1;
            }
        }
        info!(started, "runtime started");
        started
    }

    /// Mark active and make sure its loop runs.
    pub async fn activate(&self, id: &WorkerId) -> Result<(), ForgeError> {
        let worker = self.directory.require(id).await?;
        worker.activate();
        if let Some(join) = worker.spawn() {
            // 前の loop の handle は終了済みなので置き換えてよい
            self.joins.lock().await.insert(id.clone(), join);
        }
        Ok(())
    }

    /// The worker's loop exits promptly; envelopes routed to it are dropped
    /// until it is activated again.
    pub async fn deactivate(&self, id: &WorkerId) -> Result<(), ForgeError> {
        self.directory.require(id).await?.deactivate();
        Ok(())
    }

    /// Inject an envelope from outside the worker set (CLI, tests).
    pub async fn submit(
        &self,
        sender: impl Into<WorkerId>,
        recipient: impl Into<WorkerId>,
        action: impl Into<Action>,
        payload: Payload,
    ) -> RouteOutcome {
        self.directory
            .send(&sender.into(), recipient.into(), action.into(), payload, None)
            .await
    }

    pub async fn status(&self) -> DirectoryStatus {
        self.directory.status().await
    }

    /// Wait until every worker is idle and the handled count stopped moving
    /// across two consecutive samples. Returns false on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut previous: Option<u64> = None;

        loop {
            let mut idle = true;
            for worker in self.directory.workers().await {
                if !worker.is_idle().await {
                    idle = false;
                    break;
                }
            }

            if idle {
                let handled = self.directory.status().await.handled();
                if previous == Some(handled) {
                    return true;
                }
                previous = Some(handled);
            } else {
                previous = None;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(?timeout, "pipeline did not drain in time");
                return false;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Deactivate every worker and wait for their loops to exit.
    /// In-flight handlers run to completion.
    pub async fn shutdown_and_join(&self) {
        for worker in self.directory.workers().await {
            worker.deactivate();
        }
        let joins: Vec<(WorkerId, JoinHandle<()>)> = self.joins.lock().await.drain().collect();
        for (id, join) in joins {
            if let Err(e) = join.await {
                warn!(worker = %id, error = %e, "worker task ended abnormally");
            }
        }
        info!("runtime stopped");
    }
}
