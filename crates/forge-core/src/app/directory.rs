//! Directory - worker の登録と envelope のルーティング
//!
//! # 設計
//! - プロセス全体で 1 つだが、グローバルではなく `Arc<Directory>` を明示的に渡す
//! - map は RwLock で保護。lock の中では await しない（Arc を clone して外で deliver）
//! - 受信者が見つからない / inactive の場合は warn を出して捨てる（送信側にエラーは返さない）

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{
    Action, CorrelationId, DirectoryStatus, Envelope, EnvelopeId, Payload, WorkerId,
};
use crate::error::ForgeError;
use crate::mailbox::PushOutcome;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::worker::Worker;

/// Why an envelope was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotFound,
    Inactive,
    MailboxFull,
    MailboxClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    /// Delivered, but the recipient's oldest queued envelope was evicted.
    DeliveredWithEviction(EnvelopeId),
    Dropped(DropReason),
}

impl RouteOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            RouteOutcome::Delivered | RouteOutcome::DeliveredWithEviction(_)
        )
    }
}

pub struct Directory {
    workers: RwLock<HashMap<WorkerId, Arc<Worker>>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Directory {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Arc<Self> {
        Arc::new(Self {
            workers: RwLock::new(HashMap::new()),
            clock,
            ids,
        })
    }

    /// Directory on the system clock with a ULID generator.
    pub fn with_system_clock() -> Arc<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self::new(clock, ids)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ids(&self) -> &Arc<dyn IdGenerator> {
        &self.ids
    }

    /// Upsert by worker id. Returns the instance that was replaced, if any.
    pub async fn register(&self, worker: Arc<Worker>) -> Option<Arc<Worker>> {
        let id = worker.id().clone();
        let replaced = self.workers.write().await.insert(id.clone(), worker);
        match &replaced {
            Some(_) => info!(worker = %id, "worker re-registered; previous instance replaced"),
            None => info!(worker = %id, "worker registered"),
        }
        replaced
    }

    /// Remove and retire the worker; a stale `Arc` to it can no longer be delivered to.
    pub async fn unregister(&self, id: &WorkerId) -> Option<Arc<Worker>> {
        let removed = self.workers.write().await.remove(id);
        if let Some(worker) = &removed {
            worker.retire().await;
            info!(worker = %id, "worker unregistered");
        }
        removed
    }

    pub async fn resolve(&self, id: &WorkerId) -> Option<Arc<Worker>> {
        self.workers.read().await.get(id).cloned()
    }

    pub async fn worker_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.workers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn workers(&self) -> Vec<Arc<Worker>> {
        self.workers.read().await.values().cloned().collect()
    }

    /// Resolve or fail; for admin paths that need an error instead of a log line.
    pub async fn require(&self, id: &WorkerId) -> Result<Arc<Worker>, ForgeError> {
        self.resolve(id)
            .await
            .ok_or_else(|| ForgeError::UnknownWorker(id.clone()))
    }

    /// Build an envelope stamped with a fresh id and the current time.
    pub fn envelope(
        &self,
        sender: &WorkerId,
        recipient: WorkerId,
        action: Action,
        payload: Payload,
        correlation_id: Option<CorrelationId>,
    ) -> Envelope {
        Envelope::new(
            self.ids.envelope_id(sender),
            recipient,
            action,
            payload,
            self.clock.now(),
        )
        .with_correlation(correlation_id)
    }

    /// Construct and route in one step. Used by workers and external triggers.
    pub async fn send(
        &self,
        sender: &WorkerId,
        recipient: WorkerId,
        action: Action,
        payload: Payload,
        correlation_id: Option<CorrelationId>,
    ) -> RouteOutcome {
        let envelope = self.envelope(sender, recipient, action, payload, correlation_id);
        self.route(envelope).await
    }

    /// Point-to-point delivery. Fire-and-forget: never returns an error.
    pub async fn route(&self, envelope: Envelope) -> RouteOutcome {
        let Some(worker) = self.resolve(envelope.recipient()).await else {
            warn!(
                envelope = %envelope.id(),
                sender = %envelope.sender(),
                recipient = %envelope.recipient(),
                action = %envelope.action(),
                "recipient not found; envelope dropped"
            );
            return RouteOutcome::Dropped(DropReason::NotFound);
        };

        let id = envelope.id().clone();
        let recipient = envelope.recipient().clone();
        let action = envelope.action().clone();

        match worker.deliver(envelope).await {
            Ok(PushOutcome::Enqueued) => {
                debug!(envelope = %id, recipient = %recipient, action = %action, "delivered");
                RouteOutcome::Delivered
            }
            Ok(PushOutcome::Evicted(evicted)) => {
                warn!(
                    envelope = %id,
                    recipient = %recipient,
                    evicted = %evicted,
                    "mailbox full; oldest envelope evicted"
                );
                RouteOutcome::DeliveredWithEviction(evicted)
            }
            Ok(PushOutcome::Rejected) => {
                warn!(envelope = %id, recipient = %recipient, action = %action, "mailbox full; envelope dropped");
                RouteOutcome::Dropped(DropReason::MailboxFull)
            }
            Err(ForgeError::Inactive(_)) => {
                warn!(envelope = %id, recipient = %recipient, action = %action, "recipient inactive; envelope dropped");
                RouteOutcome::Dropped(DropReason::Inactive)
            }
            Err(e) => {
                warn!(envelope = %id, recipient = %recipient, error = %e, "delivery failed; envelope dropped");
                RouteOutcome::Dropped(DropReason::MailboxClosed)
            }
        }
    }

    /// One envelope per active worker other than `sender`. Returns how many were delivered.
    pub async fn broadcast(&self, sender: &WorkerId, action: Action, payload: Payload) -> usize {
        let targets: Vec<Arc<Worker>> = self
            .workers
            .read()
            .await
            .values()
            .filter(|w| w.is_active() && w.id() != sender)
            .cloned()
            .collect();

        let mut delivered = 0;
        for worker in targets {
            let envelope = self.envelope(
                sender,
                worker.id().clone(),
                action.clone(),
                payload.clone(),
                None,
            );
            if self.route(envelope).await.is_delivered() {
                delivered += 1;
            }
        }
        debug!(sender = %sender, action = %action, delivered, "broadcast");
        delivered
    }

    pub async fn status(&self) -> DirectoryStatus {
        let workers = self.workers().await;
        let mut metrics = Vec::with_capacity(workers.len());
        for worker in workers {
            metrics.push(worker.metrics().await);
        }
        DirectoryStatus::from_metrics(metrics)
    }
}
