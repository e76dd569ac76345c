//! Worker - mailbox を 1 つ持つ actor
//!
//! # ループ
//! 1. mailbox から 1 件取る（または active=false の通知で抜ける）
//! 2. `started` を activity log に記録
//! 3. `StageHandler::handle()` を実行（panic も失敗として扱う）
//! 4. `completed` / `failed` を記録、カウンタを進める
//! 5. correlation_id があり結果が空でなければ送信元に `<action>_response` を返す
//!
//! 1 worker の中では必ず逐次処理（FIFO、同時に 1 件）。

mod handler;

pub use handler::{HandlerError, StageHandler, WorkerContext};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::directory::Directory;
use crate::domain::{ActivityRecord, Envelope, WorkerId, WorkerMetrics};
use crate::error::ForgeError;
use crate::mailbox::{Mailbox, MailboxConfig, PushOutcome};
use crate::ports::ActivitySink;

/// Static identity and mailbox settings of a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub id: WorkerId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub mailbox: MailboxConfig,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl WorkerSpec {
    pub fn new(id: impl Into<WorkerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: default_version(),
            mailbox: MailboxConfig::default(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_mailbox(mut self, mailbox: MailboxConfig) -> Self {
        self.mailbox = mailbox;
        self
    }
}

pub struct Worker {
    spec: WorkerSpec,
    /// active flag。loop はこの watch を購読していて、false になった瞬間に抜ける
    active: watch::Sender<bool>,
    /// loop が動いているか（consumer を 1 本に保つため）
    running: AtomicBool,
    mailbox: Mailbox,
    succeeded: AtomicU64,
    failed: AtomicU64,
    handler: Arc<dyn StageHandler>,
    activity: Arc<dyn ActivitySink>,
    // Directory は worker を Arc で持つので、こちらは Weak（循環参照を避ける）
    directory: Weak<Directory>,
}

impl Worker {
    pub fn new(
        spec: WorkerSpec,
        handler: Arc<dyn StageHandler>,
        activity: Arc<dyn ActivitySink>,
        directory: &Arc<Directory>,
    ) -> Arc<Self> {
        let (active, _) = watch::channel(true);
        let mailbox = Mailbox::new(spec.id.clone(), spec.mailbox);
        Arc::new(Self {
            spec,
            active,
            running: AtomicBool::new(false),
            mailbox,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            handler,
            activity,
            directory: Arc::downgrade(directory),
        })
    }

    pub fn id(&self) -> &WorkerId {
        &self.spec.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn version(&self) -> &str {
        &self.spec.version
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn activate(&self) {
        if !self.active.send_replace(true) {
            info!(worker = %self.spec.id, "worker activated");
        }
    }

    /// The loop exits as soon as it is waiting; an in-flight `handle` finishes first.
    pub fn deactivate(&self) {
        if self.active.send_replace(false) {
            info!(worker = %self.spec.id, "worker deactivated");
        }
    }

    /// Stop for good: deactivate and refuse any further delivery.
    pub async fn retire(&self) {
        self.deactivate();
        self.mailbox.close().await;
    }

    /// Enqueue into the mailbox. Never waits unless the mailbox policy is `Block`;
    /// a blocked producer gives up with `Inactive` as soon as the worker is deactivated.
    pub async fn deliver(&self, envelope: Envelope) -> Result<PushOutcome, ForgeError> {
        let mut active_rx = self.active.subscribe();
        if !*active_rx.borrow_and_update() {
            return Err(ForgeError::Inactive(self.spec.id.clone()));
        }
        tokio::select! {
            pushed = self.mailbox.push(envelope) => pushed,
            () = until_inactive(&mut active_rx) => Err(ForgeError::Inactive(self.spec.id.clone())),
        }
    }

    pub async fn queued(&self) -> usize {
        self.mailbox.len().await
    }

    /// Nothing queued and nothing being handled.
    pub async fn is_idle(&self) -> bool {
        self.mailbox.is_settled().await
    }

    /// Counters are read as one consistent pair: `total = succeeded + failed`.
    pub async fn metrics(&self) -> WorkerMetrics {
        let succeeded = self.succeeded.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let total = succeeded + failed;
        WorkerMetrics {
            id: self.spec.id.clone(),
            name: self.spec.name.clone(),
            version: self.spec.version.clone(),
            total,
            succeeded,
            failed,
            success_rate: WorkerMetrics::rate(succeeded, total),
            active: self.is_active(),
            queued: self.queued().await,
        }
    }

    /// Spawn the processing loop. Returns `None` if one is already running
    /// (the mailbox has exactly one consumer).
    pub fn spawn(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(worker = %self.spec.id, "loop already running");
            return None;
        }
        let worker = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                worker.run().await;
                worker.running.store(false, Ordering::Release);
                // loop が抜けた直後に activate されると、その spawn() は None を返している。
                // consumer がいない active worker を残さないよう、ここで引き取る
                if !worker.is_active()
                    || worker.mailbox.is_closed().await
                    || worker
                        .running
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    break;
                }
                debug!(worker = %worker.spec.id, "reactivated while stopping; loop resumed");
            }
        }))
    }

    async fn run(self: &Arc<Self>) {
        let mut active_rx = self.active.subscribe();
        info!(worker = %self.spec.id, version = %self.spec.version, "worker loop started");

        loop {
            if !*active_rx.borrow_and_update() {
                break;
            }

            let envelope = tokio::select! {
                biased;
                changed = active_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                envelope = self.mailbox.pop() => envelope,
            };

            let Some(envelope) = envelope else {
                debug!(worker = %self.spec.id, "mailbox closed");
                break;
            };

            let Some(directory) = self.directory.upgrade() else {
                error!(worker = %self.spec.id, "directory dropped; stopping loop");
                self.mailbox.done().await;
                break;
            };

            self.process(directory, envelope).await;
            self.mailbox.done().await;
        }

        info!(worker = %self.spec.id, "worker loop stopped");
    }

    async fn process(&self, directory: Arc<Directory>, envelope: Envelope) {
        let clock = Arc::clone(directory.clock());
        let started = ActivityRecord::started(self.spec.id.clone(), &envelope, clock.now());
        self.emit(started.clone()).await;

        debug!(
            worker = %self.spec.id,
            envelope = %envelope.id(),
            sender = %envelope.sender(),
            action = %envelope.action(),
            "handling envelope"
        );

        let ctx = WorkerContext::new(self.spec.id.clone(), Arc::clone(&directory));
        let result = AssertUnwindSafe(self.handler.handle(&ctx, &envelope))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic))));

        match result {
            Ok(output) => {
                self.emit(started.completed(clock.now(), output.clone())).await;
                self.succeeded.fetch_add(1, Ordering::AcqRel);

                if let Some(correlation_id) = envelope.correlation_id()
                    && !output.is_empty()
                {
                    ctx.send(
                        envelope.sender().clone(),
                        envelope.action().response(),
                        output,
                        Some(correlation_id.clone()),
                    )
                    .await;
                }
            }
            Err(err) => {
                warn!(
                    worker = %self.spec.id,
                    envelope = %envelope.id(),
                    action = %envelope.action(),
                    error = %err,
                    "handler failed"
                );
                self.emit(started.failed(clock.now(), err.to_string())).await;
                self.failed.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    async fn emit(&self, record: ActivityRecord) {
        if let Err(e) = self.activity.record(record).await {
            warn!(worker = %self.spec.id, error = %e, "activity sink rejected record");
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.spec.id)
            .field("name", &self.spec.name)
            .field("active", &self.is_active())
            .finish()
    }
}

async fn until_inactive(active_rx: &mut watch::Receiver<bool>) {
    loop {
        if !*active_rx.borrow_and_update() {
            return;
        }
        if active_rx.changed().await.is_err() {
            return;
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, ActivityStatus, CorrelationId, Payload};
    use crate::impls::{InMemoryActivitySink, NoopActivitySink};
    use crate::testkit::{EchoHandler, PanickingHandler, Recorder, payload, wait_until};
    use serde_json::json;
    use std::time::Duration;

    async fn worker_with(
        directory: &Arc<Directory>,
        id: &str,
        handler: Arc<dyn StageHandler>,
        sink: Arc<dyn ActivitySink>,
    ) -> Arc<Worker> {
        let worker = Worker::new(WorkerSpec::new(id, id), handler, sink, directory);
        directory.register(worker.clone()).await;
        worker
    }

    async fn send(directory: &Directory, to: &str, body: serde_json::Value) {
        directory
            .send(&WorkerId::new("test"), WorkerId::new(to), Action::new("tick"), payload(body), None)
            .await;
    }

    #[tokio::test]
    async fn handles_envelopes_in_fifo_order() {
        let directory = Directory::with_system_clock();
        let rec = Arc::new(Recorder::default());
        let worker = worker_with(&directory, "w", rec.clone(), Arc::new(NoopActivitySink)).await;

        // loop を止めた状態で積んでから起動する
        for i in 0..50 {
            send(&directory, "w", json!({ "seq": i })).await;
        }
        worker.spawn().unwrap();

        wait_until(Duration::from_secs(2), async || worker.metrics().await.total == 50).await;
        let order: Vec<u64> = rec
            .seen()
            .await
            .iter()
            .map(|e| e.payload()["seq"].as_u64().unwrap())
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failure_does_not_stop_the_loop() {
        let directory = Directory::with_system_clock();
        let sink = Arc::new(InMemoryActivitySink::new());
        let rec = Arc::new(Recorder::default());
        let worker = worker_with(&directory, "w", rec.clone(), sink.clone()).await;
        worker.spawn().unwrap();

        send(&directory, "w", json!({ "fail": true })).await;
        send(&directory, "w", json!({ "seq": 1 })).await;
        send(&directory, "w", json!({ "fail": true })).await;
        send(&directory, "w", json!({ "seq": 2 })).await;

        wait_until(Duration::from_secs(2), async || worker.metrics().await.total == 4).await;

        let m = worker.metrics().await;
        assert_eq!(m.succeeded, 2);
        assert_eq!(m.failed, 2);
        assert_eq!(m.succeeded + m.failed, m.total);
        assert_eq!(m.success_rate, 0.5);
        assert!(worker.is_running());

        let records = sink.records().await;
        assert_eq!(records.len(), 8);
        let failed: Vec<_> = records
            .iter()
            .filter(|r| r.status == ActivityStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].error_message.as_deref(), Some("asked to fail"));
    }

    struct BrokenSink;

    #[async_trait::async_trait]
    impl ActivitySink for BrokenSink {
        async fn record(&self, _record: ActivityRecord) -> Result<(), ForgeError> {
            Err(ForgeError::Activity("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn sink_errors_do_not_fail_the_envelope() {
        let directory = Directory::with_system_clock();
        let worker = worker_with(&directory, "w", Arc::new(EchoHandler), Arc::new(BrokenSink)).await;
        worker.spawn().unwrap();

        send(&directory, "w", json!({ "x": 1 })).await;
        wait_until(Duration::from_secs(2), async || worker.metrics().await.total == 1).await;
        assert_eq!(worker.metrics().await.succeeded, 1);
    }

    #[tokio::test]
    async fn panic_is_recorded_as_failure() {
        let directory = Directory::with_system_clock();
        let sink = Arc::new(InMemoryActivitySink::new());
        let worker = worker_with(&directory, "w", Arc::new(PanickingHandler), sink.clone()).await;
        worker.spawn().unwrap();

        send(&directory, "w", json!({})).await;
        send(&directory, "w", json!({})).await;
        wait_until(Duration::from_secs(2), async || worker.metrics().await.total == 2).await;

        assert_eq!(worker.metrics().await.failed, 2);
        let finished = sink.finished().await;
        assert!(finished[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("stage blew up"));
    }

    #[tokio::test]
    async fn every_envelope_gets_started_and_finished_records() {
        let directory = Directory::with_system_clock();
        let sink = Arc::new(InMemoryActivitySink::new());
        let worker = worker_with(&directory, "w", Arc::new(EchoHandler), sink.clone()).await;
        worker.spawn().unwrap();

        send(&directory, "w", json!({ "idea_id": "7" })).await;
        wait_until(Duration::from_secs(2), async || worker.metrics().await.total == 1).await;

        let records = sink.for_worker(&WorkerId::new("w")).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, ActivityStatus::Started);
        assert_eq!(records[1].status, ActivityStatus::Completed);
        assert_eq!(records[0].envelope_id, records[1].envelope_id);
        assert_eq!(records[1].idea_id.as_deref(), Some("7"));
        assert!(records[1].duration_ms.is_some());
        assert!(records[0].output.is_none());
        assert_eq!(records[1].output, Some(payload(json!({ "idea_id": "7" }))));
    }

    #[tokio::test]
    async fn correlated_request_gets_exactly_one_response() {
        let directory = Directory::with_system_clock();
        let a = worker_with(&directory, "a", Arc::new(Recorder::default()), Arc::new(NoopActivitySink)).await;
        let b = worker_with(&directory, "b", Arc::new(EchoHandler), Arc::new(NoopActivitySink)).await;
        b.spawn().unwrap();

        directory
            .send(
                &WorkerId::new("a"),
                WorkerId::new("b"),
                Action::new("lookup"),
                payload(json!({ "q": "widget" })),
                Some(CorrelationId::new("corr-1")),
            )
            .await;

        wait_until(Duration::from_secs(2), async || a.queued().await == 1).await;
        // 余計な reply が来ないことを確認
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(a.queued().await, 1);

        let reply = a.mailbox.try_pop().await.unwrap();
        assert_eq!(reply.action().as_str(), "lookup_response");
        assert_eq!(reply.sender().as_str(), "b");
        assert_eq!(reply.correlation_id(), Some(&CorrelationId::new("corr-1")));
        assert_eq!(reply.payload()["q"], "widget");
    }

    #[tokio::test]
    async fn empty_result_sends_no_response() {
        let directory = Directory::with_system_clock();
        let a = worker_with(&directory, "a", Arc::new(Recorder::default()), Arc::new(NoopActivitySink)).await;
        let b = worker_with(&directory, "b", Arc::new(EchoHandler), Arc::new(NoopActivitySink)).await;
        b.spawn().unwrap();

        directory
            .send(
                &WorkerId::new("a"),
                WorkerId::new("b"),
                Action::new("lookup"),
                Payload::new(),
                Some(CorrelationId::new("corr-2")),
            )
            .await;

        wait_until(Duration::from_secs(2), async || b.metrics().await.total == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(a.queued().await, 0);
    }

    #[tokio::test]
    async fn deactivate_stops_the_loop_immediately() {
        let directory = Directory::with_system_clock();
        let worker = worker_with(&directory, "w", Arc::new(EchoHandler), Arc::new(NoopActivitySink)).await;
        let join = worker.spawn().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.deactivate();

        // poll 間隔を待たずに終わる
        tokio::time::timeout(Duration::from_millis(200), join)
            .await
            .expect("loop should exit promptly")
            .unwrap();
        assert!(!worker.is_running());
        assert!(matches!(
            worker.deliver(directory.envelope(
                &WorkerId::new("t"),
                WorkerId::new("w"),
                Action::new("x"),
                Payload::new(),
                None
            ))
            .await,
            Err(ForgeError::Inactive(_))
        ));
    }

    #[tokio::test]
    async fn reactivation_during_stop_keeps_a_consumer() {
        let directory = Directory::with_system_clock();
        let worker = worker_with(&directory, "w", Arc::new(EchoHandler), Arc::new(NoopActivitySink)).await;
        let join = worker.spawn().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // 止まりきる前に戻す。spawn() が None でも loop は残っていなければならない
        worker.deactivate();
        worker.activate();
        let _ = worker.spawn();

        send(&directory, "w", json!({ "x": 1 })).await;
        wait_until(Duration::from_secs(2), async || worker.metrics().await.total == 1).await;
        assert!(worker.is_running());

        worker.deactivate();
        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("loop should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn retired_worker_loop_ends_even_if_reactivated() {
        let directory = Directory::with_system_clock();
        let worker = worker_with(&directory, "w", Arc::new(EchoHandler), Arc::new(NoopActivitySink)).await;
        let join = worker.spawn().unwrap();

        worker.retire().await;
        worker.activate();

        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .expect("loop should exit")
            .unwrap();
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn reactivated_worker_can_be_spawned_again() {
        let directory = Directory::with_system_clock();
        let worker = worker_with(&directory, "w", Arc::new(EchoHandler), Arc::new(NoopActivitySink)).await;
        let join = worker.spawn().unwrap();
        assert!(worker.spawn().is_none());

        worker.deactivate();
        join.await.unwrap();

        worker.activate();
        worker.spawn().unwrap();
        send(&directory, "w", json!({ "x": 1 })).await;
        wait_until(Duration::from_secs(2), async || worker.metrics().await.total == 1).await;
    }
}
