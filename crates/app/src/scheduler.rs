//! Scheduler: evaluates the graph once per tick in dependency order.
//!
//! Every tick the [`Engine`] applies queued [`EngineCommand`]s, walks the
//! cached topological order, feeds each node the outputs its upstream nodes
//! produced earlier in the same tick, and collects the emitted pending
//! actions into a [`TickReport`]. Edits and re-evaluation requests never
//! re-enter a running tick: they only mark the engine dirty, and the next
//! tick boundary applies them and reports the evaluation as requested.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use flowhub_domain::action::PendingAction;
use flowhub_domain::error::{FlowHubError, GraphError, ValidationError};
use flowhub_domain::graph::{Connection, Graph, GraphDocument, NodeSpec};
use flowhub_domain::id::NodeId;
use flowhub_domain::time::Timestamp;
use flowhub_domain::value::Value;

use crate::node::{Inputs, NodeContext, NodeRegistry, NodeRuntime, Properties};
use crate::ports::Clock;

/// Default number of ticks during which a fresh node's actions are dropped.
pub const DEFAULT_WARMUP_TICKS: u64 = 3;

/// Graph edit or evaluation request, applied at the next tick boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    SetProperty {
        node_id: NodeId,
        key: String,
        value: Value,
    },
    AddNode(NodeSpec),
    RemoveNode(NodeId),
    Connect(Connection),
    Disconnect {
        target_node_id: NodeId,
        target_socket: String,
    },
    Reevaluate,
}

/// One discrete evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub index: u64,
    pub timestamp: Timestamp,
}

/// What happened during one tick.
#[derive(Debug)]
pub struct TickReport {
    pub tick: Tick,
    /// Pending actions for the dispatcher, in evaluation order.
    pub actions: Vec<PendingAction>,
    /// Actions dropped because their node was still warming up.
    pub suppressed: usize,
    /// Nodes whose `execute` failed; their outputs were held.
    pub failed_nodes: Vec<NodeId>,
    /// Queued commands that could not be applied.
    pub rejected: Vec<FlowHubError>,
    /// An edit, a load or a node asked for this evaluation.
    pub requested: bool,
}

struct Slot {
    type_id: String,
    /// `None` for node types missing from the registry.
    runtime: Option<Box<dyn NodeRuntime>>,
    properties: BTreeMap<String, Value>,
    outputs: BTreeMap<String, Value>,
    ticks_run: u64,
}

/// The dataflow engine: graph, node instances and their state.
pub struct Engine {
    graph: Graph,
    registry: NodeRegistry,
    slots: HashMap<NodeId, Slot>,
    clock: Arc<dyn Clock>,
    next_tick: u64,
    warmup_ticks: u64,
    dirty: bool,
    queue: Vec<EngineCommand>,
}

impl Engine {
    /// Create an engine with an empty graph.
    pub fn new(registry: NodeRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            graph: Graph::new(),
            registry,
            slots: HashMap::new(),
            clock,
            next_tick: 0,
            warmup_ticks: DEFAULT_WARMUP_TICKS,
            dirty: false,
            queue: Vec::new(),
        }
    }

    /// Set the warmup length; values below 1 are raised to 1.
    #[must_use]
    pub fn with_warmup_ticks(mut self, ticks: u64) -> Self {
        self.warmup_ticks = ticks.max(1);
        self
    }

    /// Replace the whole graph.
    ///
    /// Every node starts from its initial state and goes through warmup
    /// again. On error the current graph is kept.
    ///
    /// # Errors
    ///
    /// Returns [`FlowHubError::Graph`] for cycles, duplicate nodes, dangling
    /// connections or unknown sockets, and [`FlowHubError::Validation`] when a
    /// node's properties are rejected.
    pub fn load(&mut self, document: GraphDocument) -> Result<(), FlowHubError> {
        let graph = Graph::from_document(document)?;
        let mut slots = HashMap::with_capacity(graph.len());
        for spec in graph.nodes() {
            slots.insert(spec.id.clone(), self.create_slot(spec)?);
        }
        for connection in graph.connections() {
            check_sockets(&self.registry, &slots, connection)?;
        }
        self.graph = graph;
        self.slots = slots;
        self.dirty = true;
        tracing::info!(
            nodes = self.graph.len(),
            connections = self.graph.connections().len(),
            "graph loaded"
        );
        Ok(())
    }

    /// Queue an edit for the next tick boundary.
    pub fn enqueue(&mut self, command: EngineCommand) {
        self.queue.push(command);
        self.dirty = true;
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Latest outputs of a node.
    #[must_use]
    pub fn outputs(&self, node_id: &NodeId) -> Option<&BTreeMap<String, Value>> {
        self.slots.get(node_id).map(|slot| &slot.outputs)
    }

    #[must_use]
    pub fn output(&self, node_id: &NodeId, socket: &str) -> Option<&Value> {
        self.outputs(node_id)?.get(socket)
    }

    /// Index the next tick will carry.
    #[must_use]
    pub fn next_tick(&self) -> u64 {
        self.next_tick
    }

    /// Run one tick.
    pub fn tick(&mut self) -> TickReport {
        let requested = std::mem::take(&mut self.dirty);
        let rejected = self.apply_queued();

        let tick = Tick {
            index: self.next_tick,
            timestamp: self.clock.now(),
        };
        self.next_tick += 1;

        let mut report = TickReport {
            tick,
            actions: Vec::new(),
            suppressed: 0,
            failed_nodes: Vec::new(),
            rejected,
            requested,
        };

        let order = match self.graph.evaluation_order() {
            Ok(order) => order.to_vec(),
            Err(err) => {
                tracing::error!(%err, "graph cannot be ordered, skipping tick");
                return report;
            }
        };
        for node_id in &order {
            self.evaluate(node_id, tick, &mut report);
        }

        if !report.actions.is_empty() || report.suppressed > 0 {
            tracing::debug!(
                tick = tick.index,
                requested,
                actions = report.actions.len(),
                suppressed = report.suppressed,
                "tick evaluated"
            );
        }
        report
    }

    fn evaluate(&mut self, node_id: &NodeId, tick: Tick, report: &mut TickReport) {
        let Some(inputs) = self.gather_inputs(node_id) else {
            return;
        };
        let Some(slot) = self.slots.get_mut(node_id) else {
            return;
        };
        let Some(runtime) = slot.runtime.as_mut() else {
            return;
        };

        let node_type = runtime.type_id();
        let warming_up = slot.ticks_run < self.warmup_ticks;
        let ctx = NodeContext {
            node_id,
            node_type,
            tick: tick.index,
            now: tick.timestamp,
            is_backend: true,
            warming_up,
        };
        let result = runtime.execute(&inputs, &Properties::new(&slot.properties), &ctx);
        slot.ticks_run += 1;

        match result {
            Ok(output) => {
                slot.outputs = output.values;
                if output.reevaluate {
                    self.dirty = true;
                }
                if warming_up {
                    if !output.actions.is_empty() {
                        tracing::debug!(
                            node_id = %node_id,
                            node_type,
                            count = output.actions.len(),
                            "dropping actions during warmup"
                        );
                    }
                    report.suppressed += output.actions.len();
                } else {
                    let snapshot = inputs.snapshot();
                    report
                        .actions
                        .extend(output.actions.into_iter().map(|mut action| {
                            action.inputs.clone_from(&snapshot);
                            action
                        }));
                }
            }
            Err(err) => {
                tracing::warn!(
                    node_id = %node_id,
                    node_type,
                    %err,
                    "node execution failed, holding previous outputs"
                );
                report.failed_nodes.push(node_id.clone());
            }
        }
    }

    /// Realized inputs of a runnable node, in schema order.
    fn gather_inputs(&self, node_id: &NodeId) -> Option<Inputs> {
        let slot = self.slots.get(node_id)?;
        slot.runtime.as_ref()?;
        let schema = &self.registry.get(&slot.type_id)?.schema;
        let sockets = schema
            .inputs
            .iter()
            .map(|socket| {
                let value = self
                    .graph
                    .incoming(node_id)
                    .find(|c| c.target_socket == socket.name)
                    .and_then(|c| {
                        self.slots
                            .get(&c.source_node_id)?
                            .outputs
                            .get(&c.source_socket)
                            .cloned()
                    });
                (socket.name.to_string(), value)
            })
            .collect();
        Some(Inputs::new(sockets))
    }

    fn apply_queued(&mut self) -> Vec<FlowHubError> {
        let mut rejected = Vec::new();
        for command in std::mem::take(&mut self.queue) {
            if let Err(err) = self.apply(command) {
                tracing::warn!(%err, "graph edit rejected");
                rejected.push(err);
            }
        }
        rejected
    }

    fn apply(&mut self, command: EngineCommand) -> Result<(), FlowHubError> {
        match command {
            EngineCommand::SetProperty {
                node_id,
                key,
                value,
            } => {
                let slot = self
                    .slots
                    .get(&node_id)
                    .ok_or_else(|| GraphError::UnknownNode(node_id.clone()))?;
                let mut properties = slot.properties.clone();
                properties.insert(key.clone(), value.clone());
                if let Some(node_type) = self.registry.get(&slot.type_id) {
                    node_type.validate(&properties).map_err(|errors| {
                        ValidationError::InvalidProperties {
                            node_id: node_id.clone(),
                            errors,
                        }
                    })?;
                }
                self.graph.set_property(&node_id, key, value)?;
                if let Some(slot) = self.slots.get_mut(&node_id) {
                    slot.properties = properties;
                }
            }
            EngineCommand::AddNode(spec) => {
                if self.graph.node(&spec.id).is_some() {
                    return Err(GraphError::DuplicateNode(spec.id).into());
                }
                let slot = self.create_slot(&spec)?;
                let id = spec.id.clone();
                self.graph.add_node(spec)?;
                self.slots.insert(id, slot);
            }
            EngineCommand::RemoveNode(node_id) => {
                self.graph.remove_node(&node_id)?;
                self.slots.remove(&node_id);
            }
            EngineCommand::Connect(connection) => {
                check_sockets(&self.registry, &self.slots, &connection)?;
                self.graph.connect(connection)?;
            }
            EngineCommand::Disconnect {
                target_node_id,
                target_socket,
            } => {
                if self
                    .graph
                    .disconnect(&target_node_id, &target_socket)
                    .is_none()
                {
                    tracing::debug!(
                        node_id = %target_node_id,
                        socket = %target_socket,
                        "nothing to disconnect"
                    );
                }
            }
            EngineCommand::Reevaluate => {}
        }
        Ok(())
    }

    fn create_slot(&self, spec: &NodeSpec) -> Result<Slot, ValidationError> {
        let Some(node_type) = self.registry.get(&spec.type_id) else {
            tracing::warn!(
                node_id = %spec.id,
                node_type = %spec.type_id,
                "unknown node type, node will be skipped"
            );
            return Ok(Slot {
                type_id: spec.type_id.clone(),
                runtime: None,
                properties: spec.properties.clone(),
                outputs: BTreeMap::new(),
                ticks_run: 0,
            });
        };
        let properties = node_type.schema.resolve_properties(&spec.properties);
        node_type
            .validate(&properties)
            .map_err(|errors| ValidationError::InvalidProperties {
                node_id: spec.id.clone(),
                errors,
            })?;
        Ok(Slot {
            type_id: spec.type_id.clone(),
            runtime: Some(node_type.instantiate()),
            properties,
            outputs: BTreeMap::new(),
            ticks_run: 0,
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.graph.len())
            .field("next_tick", &self.next_tick)
            .field("warmup_ticks", &self.warmup_ticks)
            .field("dirty", &self.dirty)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

/// Check both ends of `connection` against the node schemas. Nodes of
/// unknown type accept any socket name.
fn check_sockets(
    registry: &NodeRegistry,
    slots: &HashMap<NodeId, Slot>,
    connection: &Connection,
) -> Result<(), GraphError> {
    let schema_of = |id: &NodeId| {
        slots
            .get(id)
            .and_then(|slot| registry.get(&slot.type_id))
            .map(|node_type| &node_type.schema)
    };
    if let Some(schema) = schema_of(&connection.source_node_id) {
        if !schema.has_output(&connection.source_socket) {
            return Err(GraphError::UnknownSocket {
                node_id: connection.source_node_id.clone(),
                socket: connection.source_socket.clone(),
                direction: "output",
            });
        }
    }
    if let Some(schema) = schema_of(&connection.target_node_id) {
        if !schema.has_input(&connection.target_socket) {
            return Err(GraphError::UnknownSocket {
                node_id: connection.target_node_id.clone(),
                socket: connection.target_socket.clone(),
                direction: "input",
            });
        }
    }
    Ok(())
}
