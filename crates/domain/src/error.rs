//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`FlowHubError`] via `#[from]` (or an explicit `From` impl for adapter
//! errors, which end up in [`FlowHubError::Storage`]).

use crate::id::NodeId;

/// Base error type shared by every crate in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum FlowHubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("graph error")]
    Graph(#[from] GraphError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A domain invariant was violated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("entity id must not be empty")]
    EmptyEntityId,

    #[error("node id must not be empty")]
    EmptyNodeId,

    #[error("invalid properties for node {node_id}: {}", .errors.join(", "))]
    InvalidProperties { node_id: NodeId, errors: Vec<String> },
}

/// A lookup did not find the requested item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Structural problems with a dataflow graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("input socket {node_id}.{socket} is already connected")]
    SocketAlreadyConnected { node_id: NodeId, socket: String },

    #[error("node {node_id} has no {direction} socket named {socket}")]
    UnknownSocket {
        node_id: NodeId,
        socket: String,
        direction: &'static str,
    },

    #[error("graph contains a cycle through {}", display_nodes(.nodes))]
    Cycle { nodes: Vec<NodeId> },
}

fn display_nodes(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
