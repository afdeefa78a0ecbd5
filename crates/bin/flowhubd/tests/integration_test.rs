//! End-to-end tests for the full flowhubd stack.
//!
//! Each test wires the real adapters (JSON-lines command log on a temporary
//! directory, virtual integration) to a running tick loop and drives it the
//! way the daemon does: graph edits through the engine handle, telemetry
//! pumped back into the engine context.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flowhub_adapter_jsonl_log::{Config, JsonlRecordLog};
use flowhub_adapter_virtual::{DEFAULT_LIGHT, VirtualIntegration};
use flowhub_app::context::EngineContext;
use flowhub_app::correlator::CommandCorrelator;
use flowhub_app::dispatcher::Dispatcher;
use flowhub_app::node::NodeRegistry;
use flowhub_app::notification_bus::NotificationBus;
use flowhub_app::notifier::NotificationLimiter;
use flowhub_app::ports::SystemClock;
use flowhub_app::scheduler::{Engine, EngineCommand};
use flowhub_app::tick_loop::{EngineHandle, TickLoop};
use flowhub_domain::entity::EntityState;
use flowhub_domain::graph::GraphDocument;
use flowhub_domain::id::{EntityId, NodeId};
use flowhub_domain::notification::NotificationEvent;
use flowhub_domain::record::{Attribution, ExternalContext, LogRecord, ObservedStateChange};
use flowhub_domain::value::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("flowhubd-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

struct Stack {
    handle: EngineHandle,
    tick_loop: JoinHandle<Engine>,
    context: Arc<EngineContext<JsonlRecordLog>>,
    integration: Arc<VirtualIntegration>,
    telemetry: mpsc::UnboundedReceiver<ObservedStateChange>,
    notifications: broadcast::Receiver<NotificationEvent>,
    log_path: PathBuf,
}

impl Stack {
    /// Wait for the next device report and feed it to the correlator.
    async fn pump_telemetry(&mut self) -> ObservedStateChange {
        let change = tokio::time::timeout(Duration::from_secs(2), self.telemetry.recv())
            .await
            .expect("device should report a state change")
            .expect("telemetry channel open");
        self.context.ingest_state_change(&change);
        change
    }

    async fn next_notification(&mut self) -> NotificationEvent {
        tokio::time::timeout(Duration::from_secs(5), self.notifications.recv())
            .await
            .expect("a notification should be emitted")
            .unwrap()
    }

    fn set_switch(&self, on: bool) {
        assert!(self.handle.send(EngineCommand::SetProperty {
            node_id: NodeId::from("switch"),
            key: "value".to_string(),
            value: Value::Bool(on),
        }));
    }

    fn log_lines(&self) -> Vec<serde_json::Value> {
        std::fs::read_to_string(&self.log_path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    async fn stop(self) -> Engine {
        self.handle.shutdown();
        self.tick_loop.await.unwrap()
    }
}

fn graph() -> GraphDocument {
    serde_json::from_value(serde_json::json!({
        "nodes": [
            { "id": "switch", "typeId": "constant", "properties": { "value": false } },
            {
                "id": "lamp",
                "typeId": "light_control",
                "properties": { "entityId": DEFAULT_LIGHT, "transitionMs": 0 }
            }
        ],
        "connections": [
            {
                "sourceNodeId": "switch",
                "sourceSocket": "value",
                "targetNodeId": "lamp",
                "targetSocket": "trigger"
            }
        ]
    }))
    .unwrap()
}

async fn start(dir: &TempDir) -> Stack {
    let log_path = dir.0.join("logs").join("command_log.jsonl");
    let log = Config::new(&log_path).open().unwrap();
    let clock = Arc::new(SystemClock);
    let context = Arc::new(EngineContext::new(
        CommandCorrelator::new(log),
        NotificationLimiter::new(0, 10_000),
        NotificationBus::new(16),
        clock.clone(),
    ));
    let notifications = context.subscribe();

    let (sender, telemetry) = mpsc::unbounded_channel();
    let integration = Arc::new(VirtualIntegration::demo(sender).unwrap());
    let dispatcher = Dispatcher::new(Arc::clone(&integration), Arc::clone(&context));
    let engine = Engine::new(NodeRegistry::with_builtins(), clock).with_warmup_ticks(1);
    let (handle, tick_loop) = TickLoop::start(
        engine,
        dispatcher,
        Arc::clone(&context),
        Duration::from_millis(10),
    );
    handle.load(graph()).await.unwrap();
    // let the warmup tick pass
    tokio::time::sleep(Duration::from_millis(50)).await;

    Stack {
        handle,
        tick_loop,
        context,
        integration,
        telemetry,
        notifications,
        log_path,
    }
}

#[tokio::test]
async fn should_confirm_graph_command_through_device_telemetry() {
    let dir = TempDir::new();
    let mut stack = start(&dir).await;

    stack.set_switch(true);
    let change = stack.pump_telemetry().await;
    assert_eq!(change.new_state, EntityState::On);

    let history = stack.context.history(None, 10);
    assert_eq!(history.len(), 2);
    let LogRecord::Incoming(incoming) = &history[0] else {
        panic!("newest record should be the incoming change");
    };
    assert_eq!(incoming.source, Attribution::SelfConfirmed);
    assert_eq!(incoming.source_details.node_id, Some(NodeId::from("lamp")));
    assert!(matches!(history[1], LogRecord::Outgoing(_)));
    assert!(stack.context.pending_commands().is_empty());

    let notification = stack.next_notification().await;
    assert_eq!(notification.text, "Virtual Light turned ON");

    let lines = stack.log_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "OUTGOING");
    assert_eq!(lines[0]["reason"], "trigger turned on");
    assert_eq!(lines[0]["inputs"]["trigger"], true);
    assert_eq!(lines[1]["type"], "INCOMING");
    assert_eq!(lines[1]["source"], "self, confirmed");
    assert_eq!(lines[1]["significantAttributes"]["brightness"], 255);

    stack.stop().await;
}

#[tokio::test]
async fn should_attribute_manual_toggle_to_external_user() {
    let dir = TempDir::new();
    let mut stack = start(&dir).await;
    let light = EntityId::new(DEFAULT_LIGHT).unwrap();

    stack
        .integration
        .simulate_external_toggle(
            &light,
            ExternalContext {
                id: Some("ctx-42".to_string()),
                user_id: Some("alice".to_string()),
                parent_id: None,
            },
        )
        .unwrap();
    stack.pump_telemetry().await;

    let history = stack.context.history(Some(&light), 1);
    let LogRecord::Incoming(incoming) = &history[0] else {
        panic!("expected an incoming record");
    };
    assert_eq!(incoming.source, Attribution::ExternalUser);
    assert_eq!(incoming.source_details.user_id.as_deref(), Some("alice"));

    let lines = stack.log_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["source"], "external user");

    stack.stop().await;
}

#[tokio::test]
async fn should_report_failure_when_device_is_unavailable() {
    let dir = TempDir::new();
    let mut stack = start(&dir).await;
    let light = EntityId::new(DEFAULT_LIGHT).unwrap();
    stack.integration.set_available(&light, false).unwrap();

    stack.set_switch(true);
    let notification = stack.next_notification().await;

    assert!(notification.text.starts_with("Error: failed to control light.virtual_light"));
    assert!(stack.context.pending_commands().is_empty());
    assert_eq!(stack.integration.state(&light), Some(EntityState::Off));
    assert!(stack.telemetry.try_recv().is_err());

    let engine = stack.stop().await;
    assert_eq!(
        engine.output(&NodeId::from("lamp"), "is_on"),
        Some(&Value::Bool(true))
    );
}

#[tokio::test]
async fn should_reject_cyclic_graph_and_keep_previous_one() {
    let dir = TempDir::new();
    let stack = start(&dir).await;

    let cyclic: GraphDocument = serde_json::from_value(serde_json::json!({
        "nodes": [
            { "id": "a", "typeId": "logic", "properties": { "operator": "NOT" } },
            { "id": "b", "typeId": "logic", "properties": { "operator": "NOT" } }
        ],
        "connections": [
            { "sourceNodeId": "a", "sourceSocket": "result", "targetNodeId": "b", "targetSocket": "a" },
            { "sourceNodeId": "b", "sourceSocket": "result", "targetNodeId": "a", "targetSocket": "a" }
        ]
    }))
    .unwrap();
    assert!(stack.handle.load(cyclic).await.is_err());

    let engine = stack.stop().await;
    assert!(engine.graph().node(&NodeId::from("lamp")).is_some());
}
