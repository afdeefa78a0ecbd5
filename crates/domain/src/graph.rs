//! Graph model: node specs, connections and dependency ordering.
//!
//! The graph only knows structure. What a node *does* (its sockets, its
//! state) lives in the app layer's node registry; this module enforces the
//! structural invariants:
//!
//! - node ids are unique,
//! - an input socket has at most one incoming connection (no fan-in),
//! - there are no cycles.
//!
//! The evaluation order is cached and invalidated only by structural edits
//! (add/remove node, connect/disconnect). Property edits keep the cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::id::NodeId;
use crate::value::Value;

/// Declarative description of one node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: NodeId,
    pub type_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl NodeSpec {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, type_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A directed edge from an output socket to an input socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_node_id: NodeId,
    pub source_socket: String,
    pub target_node_id: NodeId,
    pub target_socket: String,
}

impl Connection {
    #[must_use]
    pub fn new(
        source: impl Into<NodeId>,
        source_socket: impl Into<String>,
        target: impl Into<NodeId>,
        target_socket: impl Into<String>,
    ) -> Self {
        Self {
            source_node_id: source.into(),
            source_socket: source_socket.into(),
            target_node_id: target.into(),
            target_socket: target_socket.into(),
        }
    }
}

/// Serialized form of a graph, as loaded from disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// The structural dataflow graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, NodeSpec>,
    connections: Vec<Connection>,
    order: Option<Vec<NodeId>>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a document, rejecting it if any invariant fails.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`], [`GraphError::UnknownNode`],
    /// [`GraphError::SocketAlreadyConnected`] or [`GraphError::Cycle`].
    pub fn from_document(doc: GraphDocument) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for node in doc.nodes {
            graph.add_node(node)?;
        }
        for connection in doc.connections {
            graph.check_endpoints(&connection)?;
            graph.connections.push(connection);
        }
        graph.evaluation_order()?;
        Ok(graph)
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values()
    }

    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Connections feeding into `node`.
    pub fn incoming<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Connection> {
        self.connections
            .iter()
            .filter(move |c| &c.target_node_id == node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`] if the id is taken.
    pub fn add_node(&mut self, node: NodeSpec) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.nodes.insert(node.id.clone(), node);
        self.order = None;
        Ok(())
    }

    /// Remove a node and every connection touching it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if no such node exists.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<NodeSpec, GraphError> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        self.connections
            .retain(|c| &c.source_node_id != id && &c.target_node_id != id);
        self.order = None;
        Ok(node)
    }

    /// Replace one property of a node. Not a structural edit.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if no such node exists.
    pub fn set_property(
        &mut self,
        id: &NodeId,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        node.properties.insert(key.into(), value);
        Ok(())
    }

    /// Add a connection, refusing fan-in and cycles.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`], [`GraphError::SocketAlreadyConnected`]
    /// or [`GraphError::Cycle`]; the graph is left unchanged on error.
    pub fn connect(&mut self, connection: Connection) -> Result<(), GraphError> {
        self.check_endpoints(&connection)?;
        self.connections.push(connection);
        match self.compute_order() {
            Ok(order) => {
                self.order = Some(order);
                Ok(())
            }
            Err(err) => {
                self.connections.pop();
                Err(err)
            }
        }
    }

    /// Remove the connection feeding `target_socket` of `target`, if any.
    pub fn disconnect(&mut self, target: &NodeId, target_socket: &str) -> Option<Connection> {
        let index = self
            .connections
            .iter()
            .position(|c| &c.target_node_id == target && c.target_socket == target_socket)?;
        self.order = None;
        Some(self.connections.remove(index))
    }

    /// Cached dependency order, recomputed only after a structural edit.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] if the graph cannot be ordered.
    pub fn evaluation_order(&mut self) -> Result<&[NodeId], GraphError> {
        if self.order.is_none() {
            self.order = Some(self.compute_order()?);
        }
        Ok(self.order.as_deref().unwrap_or_default())
    }

    /// Kahn's algorithm; ties are broken by node id so the result is stable.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] naming the nodes of one cycle.
    pub fn compute_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: BTreeMap<&NodeId, usize> = self.nodes.keys().map(|id| (id, 0)).collect();
        let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for c in &self.connections {
            adjacency
                .entry(&c.source_node_id)
                .or_default()
                .push(&c.target_node_id);
            if let Some(degree) = in_degree.get_mut(&c.target_node_id) {
                *degree += 1;
            }
        }

        let mut ready: BTreeSet<&NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for next in adjacency.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(*next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*next);
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            let stuck: BTreeSet<&NodeId> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id)
                .collect();
            Err(GraphError::Cycle {
                nodes: self.trace_cycle(&stuck),
            })
        }
    }

    /// Every stuck node has a stuck predecessor, so walking predecessors must revisit a node.
    fn trace_cycle(&self, stuck: &BTreeSet<&NodeId>) -> Vec<NodeId> {
        let Some(&start) = stuck.first() else {
            return Vec::new();
        };
        let mut path: Vec<&NodeId> = vec![start];
        let mut current = start;
        loop {
            let Some(prev) = self
                .connections
                .iter()
                .filter(|c| &c.target_node_id == current)
                .map(|c| &c.source_node_id)
                .find(|source| stuck.contains(source))
            else {
                return path.into_iter().cloned().collect();
            };
            if let Some(pos) = path.iter().position(|id| *id == prev) {
                let mut cycle: Vec<NodeId> = path[pos..].iter().map(|id| (*id).clone()).collect();
                cycle.reverse();
                return cycle;
            }
            path.push(prev);
            current = prev;
        }
    }

    fn check_endpoints(&self, connection: &Connection) -> Result<(), GraphError> {
        for id in [&connection.source_node_id, &connection.target_node_id] {
            if !self.nodes.contains_key(id) {
                return Err(GraphError::UnknownNode(id.clone()));
            }
        }
        let taken = self.connections.iter().any(|c| {
            c.target_node_id == connection.target_node_id
                && c.target_socket == connection.target_socket
        });
        if taken {
            return Err(GraphError::SocketAlreadyConnected {
                node_id: connection.target_node_id.clone(),
                socket: connection.target_socket.clone(),
            });
        }
        Ok(())
    }
}
