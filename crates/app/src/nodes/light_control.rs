//! Light control node: turns one device on or off and applies colour.
//!
//! Commands are issued on trigger edges only; a steady trigger never
//! re-sends. While the light is on, a changed `color` input re-sends a
//! turn-on carrying the new colour.

use flowhub_domain::action::ColorData;
use flowhub_domain::id::EntityId;
use flowhub_domain::value::SocketType;

use crate::node::{Inputs, Node, NodeContext, NodeError, NodeOutput, NodeSchema, Properties};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightControlState {
    last_trigger: Option<bool>,
    last_color: Option<ColorData>,
}

#[derive(Debug, Default)]
pub struct LightControlNode;

impl LightControlNode {
    fn entity_id(props: &Properties<'_>) -> Result<EntityId, NodeError> {
        EntityId::new(props.str("entityId").unwrap_or_default()).map_err(|err| {
            NodeError::InvalidProperty {
                name: "entityId".to_string(),
                reason: err.to_string(),
            }
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn transition_ms(props: &Properties<'_>) -> u64 {
    props.number("transitionMs").unwrap_or(0.0).max(0.0).round() as u64
}

impl Node for LightControlNode {
    const TYPE_ID: &'static str = "light_control";
    type State = LightControlState;

    fn schema() -> NodeSchema {
        NodeSchema::new()
            .input("trigger", SocketType::Any)
            .input("color", SocketType::Object)
            .output("is_on", SocketType::Boolean)
            .property("entityId", SocketType::String, "")
            .property("transitionMs", SocketType::Number, 0.0)
    }

    fn execute(
        &self,
        inputs: &Inputs,
        props: &Properties<'_>,
        ctx: &NodeContext<'_>,
        state: &mut LightControlState,
    ) -> Result<NodeOutput, NodeError> {
        let entity_id = Self::entity_id(props)?;
        let color = match inputs.get("color").map(ColorData::from_value).transpose() {
            Ok(color) => color.flatten().filter(|c| !c.is_empty()),
            Err(err) => {
                tracing::debug!(node_id = %ctx.node_id, %err, "ignoring malformed color input");
                None
            }
        };
        let mut out = NodeOutput::new();

        if let Some(on) = inputs.truthy("trigger") {
            if state.last_trigger != Some(on) {
                let reason = if on {
                    "trigger turned on"
                } else {
                    "trigger turned off"
                };
                let color_data = if on { color.clone() } else { None };
                out = out.action(ctx.action(
                    entity_id,
                    on,
                    color_data,
                    transition_ms(props),
                    reason,
                ));
                state.last_trigger = Some(on);
            } else if on && color.is_some() && color != state.last_color {
                out = out.action(ctx.action(
                    entity_id,
                    true,
                    color.clone(),
                    transition_ms(props),
                    "color changed",
                ));
            }
        }
        state.last_color = color;

        Ok(out.set("is_on", state.last_trigger.unwrap_or(false)))
    }

    fn validate(props: &Properties<'_>) -> Result<(), Vec<String>> {
        Self::entity_id(props)
            .map(|_| ())
            .map_err(|err| vec![err.to_string()])
    }
}
