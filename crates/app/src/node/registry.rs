//! Node registry: explicit mapping from type id to node factory.

use std::collections::{BTreeMap, HashMap};

use flowhub_domain::value::Value;

use super::{Inputs, Node, NodeContext, NodeError, NodeOutput, NodeSchema, Properties};

/// Object-safe handle to one node instance and the state it owns.
pub trait NodeRuntime: Send {
    fn type_id(&self) -> &'static str;

    /// Run the node for one tick.
    ///
    /// # Errors
    ///
    /// Propagates the node's own [`NodeError`].
    fn execute(
        &mut self,
        inputs: &Inputs,
        props: &Properties<'_>,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, NodeError>;
}

struct Instance<N: Node> {
    node: N,
    state: N::State,
}

impl<N: Node> NodeRuntime for Instance<N> {
    fn type_id(&self) -> &'static str {
        N::TYPE_ID
    }

    fn execute(
        &mut self,
        inputs: &Inputs,
        props: &Properties<'_>,
        ctx: &NodeContext<'_>,
    ) -> Result<NodeOutput, NodeError> {
        self.node.execute(inputs, props, ctx, &mut self.state)
    }
}

fn instantiate<N: Node>() -> Box<dyn NodeRuntime> {
    Box::new(Instance::<N> {
        node: N::default(),
        state: N::State::default(),
    })
}

/// A registered node type.
pub struct NodeType {
    pub type_id: &'static str,
    pub schema: NodeSchema,
    validate: fn(&Properties<'_>) -> Result<(), Vec<String>>,
    create: fn() -> Box<dyn NodeRuntime>,
}

impl NodeType {
    /// Type-check `properties` against the schema, then run the node's own validation.
    ///
    /// # Errors
    ///
    /// Returns every problem found.
    pub fn validate(&self, properties: &BTreeMap<String, Value>) -> Result<(), Vec<String>> {
        let mut errors = self.schema.type_errors(properties);
        if errors.is_empty() {
            if let Err(mut custom) = (self.validate)(&Properties::new(properties)) {
                errors.append(&mut custom);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fresh instance with the type's initial state.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn NodeRuntime> {
        (self.create)()
    }
}

impl std::fmt::Debug for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeType")
            .field("type_id", &self.type_id)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Registry of available node types.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    types: HashMap<&'static str, NodeType>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in node type.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::nodes::register_builtins(&mut registry);
        registry
    }

    /// Register `N`, replacing any previous type with the same id.
    pub fn register<N: Node>(&mut self) -> &mut Self {
        let previous = self.types.insert(
            N::TYPE_ID,
            NodeType {
                type_id: N::TYPE_ID,
                schema: N::schema(),
                validate: N::validate,
                create: instantiate::<N>,
            },
        );
        if previous.is_some() {
            tracing::debug!(type_id = N::TYPE_ID, "node type re-registered");
        }
        self
    }

    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&NodeType> {
        self.types.get(type_id)
    }

    /// Registered type ids, sorted.
    #[must_use]
    pub fn type_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.types.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
