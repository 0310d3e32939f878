//! orgevents-pipeline - trigger entry point.
//!
//! Reads one trigger payload (from a file argument, or stdin if none is
//! given), classifies it, and routes it through the pipeline exactly once.
//! Production deployments invoke this per-trigger from their own scheduler;
//! this binary is the local harness for that invocation.

use std::io::Read as _;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orgevents_pipeline::config::Config;
use orgevents_pipeline::counters;
use orgevents_pipeline::directory::{AccountDirectory, StaticAccountNames};
use orgevents_pipeline::dispatch::{DispatchConfig, Dispatcher};
use orgevents_pipeline::health::fixture::SimulatedHealthFeed;
use orgevents_pipeline::health::HealthFeed;
use orgevents_pipeline::llm::{Analyzer, BedrockAnalyzer, FallbackOnlyAnalyzer};
use orgevents_pipeline::queue::InMemoryWorkQueue;
use orgevents_pipeline::readapi::NullMailer;
use orgevents_pipeline::scheduler::{self, Scheduler};
use orgevents_pipeline::store::{RecordStore, SqliteRecordStore};
use orgevents_pipeline::worker::Worker;

fn read_trigger_payload() -> anyhow::Result<serde_json::Value> {
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading trigger payload from {path}"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading trigger payload from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("parsing trigger payload as JSON")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orgevents_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(model_id = %config.llm.model_id, "loaded configuration");

    let store = Arc::new(
        SqliteRecordStore::open(
            &config.sqlite_path.to_string_lossy(),
            config.retention_window_days,
        )
        .context("opening record/counter store")?,
    );
    let change_rx = store.subscribe();

    if counters::bootstrap_if_empty(store.as_ref(), store.as_ref()).await? {
        info!("counter table was cold; ran a full recompute before serving triggers");
    }

    // No delegated-admin organization health API client is wired into this
    // binary; it drives the pipeline against the in-process fixture feed,
    // same as the pipeline's own tests. A deployment with real credentials
    // supplies its own `HealthFeed`/`AccountNameLookup` at this seam.
    warn!("no production HealthFeed/AccountNameLookup configured; running against the simulated fixture");
    let feed: Arc<dyn HealthFeed> = Arc::new(SimulatedHealthFeed::new());
    let directory = Arc::new(AccountDirectory::new(Arc::new(StaticAccountNames::new(
        Default::default(),
    ))));

    let analyzer: Arc<dyn Analyzer> = match &config.llm.api_key {
        Some(api_key) => Arc::new(BedrockAnalyzer::new(
            std::env::var("LLM_ENDPOINT").unwrap_or_default(),
            config.llm.model_id.clone(),
            api_key.clone(),
            config.llm.temperature as f32,
            config.llm.top_p as f32,
            config.llm.max_tokens,
        )),
        None => {
            warn!("no LLM_API_KEY configured; analyzer falls back to deterministic analysis for every request");
            Arc::new(FallbackOnlyAnalyzer)
        }
    };

    let queue = Arc::new(InMemoryWorkQueue::new());
    let _mailer = NullMailer;

    let dispatcher = Arc::new(Dispatcher::new(
        feed.clone(),
        analyzer.clone(),
        store.clone(),
        queue.clone(),
        DispatchConfig {
            excluded_services: config.excluded_services.clone(),
            batch_size: config.batch_size,
        },
    ));
    let worker = Arc::new(Worker::new(
        feed.clone(),
        analyzer.clone(),
        store.clone(),
        directory.clone(),
        "orgevents-pipeline-worker",
    ));

    let scheduler = Scheduler::new(
        feed,
        dispatcher,
        worker,
        store.clone(),
        store,
        change_rx,
        config.analysis_window_days as u32,
        "orgevents-pipeline-worker",
    );

    let trigger_payload = read_trigger_payload()?;
    let trigger = scheduler::classify_trigger(&trigger_payload)?;
    let outcome = scheduler.route(trigger).await?;

    info!(?outcome, "trigger routed");
    Ok(())
}
