//! Built-in node types.

mod compare;
mod constant;
mod delay;
mod light_control;
mod logic;

pub use compare::{CompareNode, CompareState};
pub use constant::ConstantNode;
pub use delay::{DelayNode, DelayState};
pub use light_control::{LightControlNode, LightControlState};
pub use logic::{LogicNode, LogicState};

use crate::node::NodeRegistry;

/// Register every built-in node type.
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry
        .register::<ConstantNode>()
        .register::<DelayNode>()
        .register::<LogicNode>()
        .register::<CompareNode>()
        .register::<LightControlNode>();
}
