//! # flowhubd: flowhub daemon
//!
//! Composition root that wires the engine to its adapters and runs the
//! tick loop until interrupted.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialize logging
//! - Open the JSON-lines command log
//! - Construct the engine context, dispatcher and tick loop
//! - Load the graph document
//! - Feed device telemetry back into the correlator
//! - Log notifications that pass the rate limiter
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing_subscriber::EnvFilter;

use flowhub_adapter_virtual::VirtualIntegration;
use flowhub_app::context::EngineContext;
use flowhub_app::correlator::CommandCorrelator;
use flowhub_app::dispatcher::Dispatcher;
use flowhub_app::node::NodeRegistry;
use flowhub_app::notification_bus::NotificationBus;
use flowhub_app::notifier::NotificationLimiter;
use flowhub_app::ports::{MemoryRecordLog, RecordLog, SystemClock};
use flowhub_app::scheduler::Engine;
use flowhub_app::tick_loop::TickLoop;
use flowhub_domain::graph::GraphDocument;
use flowhub_domain::record::ObservedStateChange;

use crate::config::{Config, CorrelatorConfig};

type SharedContext = EngineContext<Box<dyn RecordLog>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let clock = Arc::new(SystemClock);

    // Correlation & notifications
    let correlator = CommandCorrelator::new(open_record_log(&config.correlator))
        .with_window_ms(config.correlator.window_ms)
        .with_history_capacity(config.correlator.history_capacity);
    let limiter = NotificationLimiter::new(
        config.notifications.global_interval_ms,
        config.notifications.per_device_interval_ms,
    );
    let context: Arc<SharedContext> = Arc::new(
        EngineContext::new(correlator, limiter, NotificationBus::default(), clock.clone())
            .with_notifications(config.notifications.enabled),
    );
    let notifications = spawn_notification_log(&context);

    // Devices
    let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
    let integration = if config.integrations.virtual_enabled {
        VirtualIntegration::demo(telemetry_tx)?
    } else {
        VirtualIntegration::new(telemetry_tx)
    };
    let telemetry = spawn_telemetry_ingest(telemetry_rx, Arc::clone(&context));

    // Engine
    let engine = Engine::new(NodeRegistry::with_builtins(), clock)
        .with_warmup_ticks(config.engine.warmup_ticks);
    let dispatcher = Dispatcher::new(Arc::new(integration), Arc::clone(&context));
    let (handle, tick_loop) =
        TickLoop::start(engine, dispatcher, Arc::clone(&context), config.tick_interval());

    let document = load_graph(&config.engine.graph_path)?;
    handle
        .load(document)
        .await
        .with_context(|| format!("rejected graph {}", config.engine.graph_path.display()))?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");

    handle.shutdown();
    let engine = tick_loop.await.context("tick loop panicked")?;
    telemetry.abort();
    notifications.abort();
    tracing::info!(ticks = engine.next_tick(), "flowhubd stopped");
    Ok(())
}

/// Open the JSON-lines log, falling back to memory-only history.
fn open_record_log(config: &CorrelatorConfig) -> Box<dyn RecordLog> {
    let log_config = flowhub_adapter_jsonl_log::Config {
        path: config.log_path.clone(),
        max_bytes: config.max_log_bytes,
    };
    match log_config.open() {
        Ok(log) => Box::new(log),
        Err(err) => {
            tracing::warn!(
                path = %config.log_path.display(),
                %err,
                "command log unavailable, keeping history in memory only"
            );
            Box::new(MemoryRecordLog::default())
        }
    }
}

fn load_graph(path: &Path) -> anyhow::Result<GraphDocument> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("invalid graph document {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "graph document not found, starting empty");
            Ok(GraphDocument::default())
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to read graph document {}", path.display()))
        }
    }
}

fn spawn_telemetry_ingest(
    mut receiver: mpsc::UnboundedReceiver<ObservedStateChange>,
    context: Arc<SharedContext>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(change) = receiver.recv().await {
            let ingest_context = Arc::clone(&context);
            let ingested =
                tokio::task::spawn_blocking(move || ingest_context.ingest_state_change(&change))
                    .await;
            let record = match ingested {
                Ok(record) => record,
                Err(err) => {
                    tracing::error!(%err, "state change ingest failed");
                    continue;
                }
            };
            tracing::info!(
                entity_id = %record.entity_id,
                old_state = %record.old_state,
                new_state = %record.new_state,
                source = %record.source,
                "state change observed"
            );
        }
    })
}

fn spawn_notification_log(context: &SharedContext) -> JoinHandle<()> {
    let mut stream = BroadcastStream::new(context.subscribe());
    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => tracing::info!(
                    device_id = event.device_id.as_deref().unwrap_or("-"),
                    "notification: {}",
                    event.text
                ),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification log lagging");
                }
            }
        }
    })
}
