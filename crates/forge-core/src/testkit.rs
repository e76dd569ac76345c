//! Test-only handlers and helpers shared across module tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

use crate::app::{ForgeBuilder, RouteOutcome, Runtime};
use crate::domain::{Action, Envelope, Payload, WorkerId};
use crate::impls::InMemoryActivitySink;
use crate::worker::{HandlerError, StageHandler, WorkerContext, WorkerSpec};

pub fn payload(v: serde_json::Value) -> Payload {
    v.as_object().cloned().unwrap_or_default()
}

/// Poll `check` until it returns true; panics after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut check: F)
where
    F: AsyncFnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Records every envelope it sees; fails the ones whose payload has `"fail": true`.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<Envelope>>,
}

impl Recorder {
    pub async fn seen(&self) -> Vec<Envelope> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl StageHandler for Recorder {
    async fn handle(&self, _ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        self.seen.lock().await.push(envelope.clone());
        if envelope.payload().get("fail").and_then(|v| v.as_bool()) == Some(true) {
            return Err(HandlerError::Other("asked to fail".to_string()));
        }
        Ok(Payload::new())
    }
}

/// Returns its input payload as the result.
pub struct EchoHandler;

#[async_trait]
impl StageHandler for EchoHandler {
    async fn handle(&self, _ctx: &WorkerContext, envelope: &Envelope) -> Result<Payload, HandlerError> {
        Ok(envelope.payload().clone())
    }
}

pub struct FailingHandler;

#[async_trait]
impl StageHandler for FailingHandler {
    async fn handle(&self, _ctx: &WorkerContext, _envelope: &Envelope) -> Result<Payload, HandlerError> {
        Err(HandlerError::Other("always fails".to_string()))
    }
}

pub struct PanickingHandler;

#[async_trait]
impl StageHandler for PanickingHandler {
    async fn handle(&self, _ctx: &WorkerContext, _envelope: &Envelope) -> Result<Payload, HandlerError> {
        panic!("stage blew up");
    }
}

/// One stage under test, with a `Recorder` standing in for each of its
/// downstream workers. Loops are already started.
pub struct Harness {
    pub runtime: Runtime,
    pub sink: Arc<InMemoryActivitySink>,
    id: WorkerId,
    handler: Arc<dyn StageHandler>,
    recorders: HashMap<WorkerId, Arc<Recorder>>,
}

impl Harness {
    pub async fn new(id: impl Into<WorkerId>, handler: Arc<dyn StageHandler>) -> Self {
        let id = id.into();
        let sink = Arc::new(InMemoryActivitySink::new());
        let mut builder = ForgeBuilder::new()
            .with_activity_sink(sink.clone())
            .register(WorkerSpec::new(id.clone(), id.as_str()), Arc::clone(&handler));

        let mut recorders = HashMap::new();
        for downstream in handler.downstream() {
            if downstream == id || recorders.contains_key(&downstream) {
                continue;
            }
            let recorder = Arc::new(Recorder::default());
            builder = builder.register(
                WorkerSpec::new(downstream.clone(), downstream.as_str()),
                recorder.clone(),
            );
            recorders.insert(downstream, recorder);
        }

        let runtime = builder.build().await.unwrap();
        runtime.start().await;
        Self {
            runtime,
            sink,
            id,
            handler,
            recorders,
        }
    }

    pub fn recorder(&self, id: impl Into<WorkerId>) -> &Arc<Recorder> {
        let id = id.into();
        self.recorders
            .get(&id)
            .unwrap_or_else(|| panic!("no recorder for {id}"))
    }

    /// Route through the directory, as another worker would.
    pub async fn send(&self, action: &str, payload: Payload) -> RouteOutcome {
        self.runtime
            .submit("test", self.id.clone(), action, payload)
            .await
    }

    /// Call the handler directly to inspect its result; sends still go through
    /// the directory to the recorders.
    pub async fn call(&self, action: &str, payload: Payload) -> Result<Payload, HandlerError> {
        let directory = Arc::clone(self.runtime.directory());
        let envelope = directory.envelope(
            &WorkerId::from("test"),
            self.id.clone(),
            Action::from(action),
            payload,
            None,
        );
        let ctx = WorkerContext::new(self.id.clone(), directory);
        self.handler.handle(&ctx, &envelope).await
    }

    pub async fn settle(&self) {
        assert!(
            self.runtime.wait_idle(Duration::from_secs(2)).await,
            "pipeline did not settle"
        );
    }
}

struct MessageCollector<'a>(&'a mut String);

impl Visit for MessageCollector<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

/// Collects the message of every WARN event emitted on this thread.
#[derive(Clone, Default)]
pub struct WarnCapture {
    messages: Arc<std::sync::Mutex<Vec<String>>>,
}

impl WarnCapture {
    /// Install as the thread-local default until the guard is dropped.
    /// `#[tokio::test]` runs on one thread, so this sees everything the test awaits directly.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<S> Layer<S> for WarnCapture
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut message = String::new();
        event.record(&mut MessageCollector(&mut message));
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}
