//! Node runtime contract: the uniform interface every node type implements.
//!
//! A node type is a [`Node`] implementation: a schema (inputs, outputs,
//! properties with defaults), an `execute` function called once per tick,
//! an optional `validate`, and a typed `State` that the engine keeps for
//! each instance across ticks.
//!
//! Contract rules:
//! - `execute` must cope with any combination of missing inputs; a missing
//!   input is "no data", not an error.
//! - Device control is expressed only through returned
//!   [`PendingAction`]s; `execute` performs no I/O.
//! - `state` is the only channel for remembering things across ticks.
//! - During warmup the engine drops emitted actions but keeps the state
//!   changes, so nodes never need to check [`NodeContext::warming_up`]
//!   themselves.

mod io;
mod registry;
mod schema;

pub use io::{Inputs, NodeOutput, Properties};
pub use registry::{NodeRegistry, NodeRuntime, NodeType};
pub use schema::{NodeSchema, PropertySpec, SocketSpec};

use flowhub_domain::action::{ColorData, PendingAction};
use flowhub_domain::id::{EntityId, NodeId};
use flowhub_domain::time::{Timestamp, millis_between};

/// Failure raised by a node's `execute`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("invalid property {name}: {reason}")]
    InvalidProperty { name: String, reason: String },

    #[error("invalid input {name}: {reason}")]
    InvalidInput { name: String, reason: String },
}

/// Per-tick context handed to every node.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub node_id: &'a NodeId,
    pub node_type: &'static str,
    pub tick: u64,
    pub now: Timestamp,
    pub is_backend: bool,
    pub warming_up: bool,
}

impl NodeContext<'_> {
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Milliseconds elapsed since `earlier`, never negative.
    #[must_use]
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        u64::try_from(millis_between(earlier, self.now)).unwrap_or(0)
    }

    /// Start a pending action whose origin fields point at this node.
    #[must_use]
    pub fn action(
        &self,
        entity_id: EntityId,
        turn_on: bool,
        color_data: Option<ColorData>,
        transition_ms: u64,
        reason: impl Into<String>,
    ) -> PendingAction {
        PendingAction {
            entity_id,
            turn_on,
            color_data,
            transition_ms,
            origin_node_id: self.node_id.clone(),
            origin_node_type: self.node_type.to_string(),
            reason: reason.into(),
            inputs: std::collections::BTreeMap::new(),
        }
    }
}

/// A node type.
///
/// Implementations are registered with [`NodeRegistry::register`] and
/// instantiated once per graph node; `Self::State::default()` is the
/// internal-state template.
pub trait Node: Default + Send + Sync + 'static {
    /// Type id referenced by graph documents.
    const TYPE_ID: &'static str;

    /// Per-instance state kept across ticks.
    type State: Default + Send + 'static;

    fn schema() -> NodeSchema;

    /// Compute this tick's outputs.
    ///
    /// # Errors
    ///
    /// A [`NodeError`] makes the engine hold this node's previous outputs
    /// for the tick; downstream evaluation continues.
    fn execute(
        &self,
        inputs: &Inputs,
        props: &Properties<'_>,
        ctx: &NodeContext<'_>,
        state: &mut Self::State,
    ) -> Result<NodeOutput, NodeError>;

    /// Check a property set before the node is instantiated.
    ///
    /// # Errors
    ///
    /// Returns every problem found, as human-readable messages.
    fn validate(_props: &Properties<'_>) -> Result<(), Vec<String>> {
        Ok(())
    }
}
