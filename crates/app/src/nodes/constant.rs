//! Constant source node, the usual target of UI property edits.

use flowhub_domain::value::SocketType;

use crate::node::{Inputs, Node, NodeContext, NodeError, NodeOutput, NodeSchema, Properties};

/// Emits its `value` property every tick. Used as a UI-driven source.
#[derive(Debug, Default)]
pub struct ConstantNode;

impl Node for ConstantNode {
    const TYPE_ID: &'static str = "constant";
    type State = ();

    fn schema() -> NodeSchema {
        NodeSchema::new()
            .output("value", SocketType::Any)
            .property("value", SocketType::Any, false)
    }

    fn execute(
        &self,
        _inputs: &Inputs,
        props: &Properties<'_>,
        _ctx: &NodeContext<'_>,
        _state: &mut (),
    ) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().set_opt("value", props.get("value").cloned()))
    }
}
