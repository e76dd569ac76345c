use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use forge_core::domain::{ActivityRecord, Stage, actions};
use forge_core::impls::{InMemoryActivitySink, TracingActivitySink};
use forge_core::ports::ActivitySink;
use forge_core::stages::register_pipeline;
use forge_core::{ForgeBuilder, ForgeConfig, Runtime};

/// Idea forge - capture an idea and run it through the pipeline
#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to forge.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long)]
    verbose: bool,

    /// Log activity records through tracing instead of printing them
    #[arg(long)]
    trace_activity: bool,

    /// Seconds to wait for the pipeline to drain
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture one idea
    Submit {
        /// Idea text (transcript for voice, description for image)
        #[arg(short, long)]
        text: String,

        #[arg(short, long, value_enum, default_value_t = Kind::Text)]
        kind: Kind,

        /// low | normal | high | urgent | emergency
        #[arg(short, long, default_value = "normal")]
        urgency: String,

        /// Required for `--kind image`
        #[arg(long)]
        image_path: Option<String>,

        #[arg(long)]
        idea_id: Option<String>,
    },

    /// Capture a handful of sample ideas
    Demo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Text,
    Voice,
    Dream,
    Image,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Text => "text",
            Kind::Voice => "voice",
            Kind::Dream => "dream",
            Kind::Image => "image",
        }
    }
}

fn capture_payload(
    kind: Kind,
    text: &str,
    urgency: &str,
    image_path: Option<&str>,
    idea_id: Option<&str>,
) -> Result<Map<String, Value>> {
    let mut p = Map::new();
    p.insert("type".into(), json!(kind.as_str()));
    p.insert("urgency".into(), json!(urgency));
    match kind {
        Kind::Text | Kind::Dream => {
            p.insert("content".into(), json!(text));
        }
        Kind::Voice => {
            p.insert("transcript".into(), json!(text));
        }
        Kind::Image => {
            let Some(path) = image_path else {
                bail!("--image-path is required with --kind image");
            };
            p.insert("image_path".into(), json!(path));
            p.insert("description".into(), json!(text));
        }
    }
    if let Some(id) = idea_id {
        p.insert("idea_id".into(), json!(id));
    }
    Ok(p)
}

fn demo_payloads() -> Result<Vec<Map<String, Value>>> {
    Ok(vec![
        capture_payload(Kind::Text, "build a widget", "normal", None, None)?,
        capture_payload(
            Kind::Text,
            "urgent: an amazing new app that nobody has built, this is it",
            "high",
            None,
            None,
        )?,
        capture_payload(Kind::Voice, "we should start a small music business soon", "normal", None, None)?,
        capture_payload(Kind::Dream, "a vision of a library made of light", "normal", None, None)?,
    ])
}

async fn run(runtime: &Runtime, inputs: Vec<Map<String, Value>>, timeout: Duration) -> Result<bool> {
    runtime.start().await;

    for input in inputs {
        let outcome = runtime
            .submit("cli", Stage::Capture, actions::CAPTURE_INPUT, input)
            .await;
        if !outcome.is_delivered() {
            bail!("capture did not accept the input: {outcome:?}");
        }
    }

    let drained = tokio::select! {
        drained = runtime.wait_idle(timeout) => drained,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            false
        }
    };
    runtime.shutdown_and_join().await;
    Ok(drained)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ForgeConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ForgeConfig::default(),
    };

    let log_level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let memory = Arc::new(InMemoryActivitySink::new());
    let sink: Arc<dyn ActivitySink> = if args.trace_activity {
        Arc::new(TracingActivitySink)
    } else {
        memory.clone()
    };

    let builder = ForgeBuilder::new().with_config(&config).with_activity_sink(sink);
    let runtime = register_pipeline(builder, &config.pipeline)
        .build()
        .await
        .context("failed to wire the pipeline")?;

    let inputs = match &args.command {
        Command::Submit {
            text,
            kind,
            urgency,
            image_path,
            idea_id,
        } => vec![capture_payload(
            *kind,
            text,
            urgency,
            image_path.as_deref(),
            idea_id.as_deref(),
        )?],
        Command::Demo => demo_payloads()?,
    };
    info!(ideas = inputs.len(), "submitting");

    let drained = run(&runtime, inputs, Duration::from_secs(args.timeout_secs)).await?;

    let status = runtime.status().await;
    let activity: Vec<ActivityRecord> = memory.records().await;
    let report = json!({
        "drained": drained,
        "status": status,
        "activity": activity,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );
    Ok(())
}
