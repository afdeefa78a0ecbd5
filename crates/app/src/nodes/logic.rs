//! Logic gate node.
//!
//! Missing inputs read as `false` as long as at least one input carries
//! data; with no data at all the gate produces nothing. In pulse mode a
//! rising edge of the gate result holds `result` true for `pulseMs`, and a
//! gate that has not produced anything yet counts as `false`.

use flowhub_domain::time::{Timestamp, add_millis};
use flowhub_domain::value::SocketType;

use crate::node::{Inputs, Node, NodeContext, NodeError, NodeOutput, NodeSchema, Properties};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Not,
}

impl Operator {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "XOR" => Some(Self::Xor),
            "NAND" => Some(Self::Nand),
            "NOR" => Some(Self::Nor),
            "NOT" => Some(Self::Not),
            _ => None,
        }
    }

    fn apply(self, a: bool, b: bool) -> bool {
        match self {
            Self::And => a && b,
            Self::Or => a || b,
            Self::Xor => a != b,
            Self::Nand => !(a && b),
            Self::Nor => !(a || b),
            Self::Not => !a,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicState {
    last_gate: Option<bool>,
    pulse_until: Option<Timestamp>,
}

#[derive(Debug, Default)]
pub struct LogicNode;

impl LogicNode {
    fn operator(props: &Properties<'_>) -> Result<Operator, NodeError> {
        let raw = props.str("operator").unwrap_or("AND");
        Operator::parse(raw).ok_or_else(|| NodeError::InvalidProperty {
            name: "operator".to_string(),
            reason: format!("unknown operator {raw:?}"),
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pulse_ms(props: &Properties<'_>) -> u64 {
    props.number("pulseMs").unwrap_or(500.0).max(0.0).round() as u64
}

impl Node for LogicNode {
    const TYPE_ID: &'static str = "logic";
    type State = LogicState;

    fn schema() -> NodeSchema {
        NodeSchema::new()
            .input("a", SocketType::Any)
            .input("b", SocketType::Any)
            .output("result", SocketType::Boolean)
            .property("operator", SocketType::String, "AND")
            .property("pulse", SocketType::Boolean, false)
            .property("pulseMs", SocketType::Number, 500.0)
    }

    fn execute(
        &self,
        inputs: &Inputs,
        props: &Properties<'_>,
        ctx: &NodeContext<'_>,
        state: &mut LogicState,
    ) -> Result<NodeOutput, NodeError> {
        let operator = Self::operator(props)?;
        let a = inputs.truthy("a");
        let b = if operator == Operator::Not {
            None
        } else {
            inputs.truthy("b")
        };
        if a.is_none() && b.is_none() {
            return Ok(NodeOutput::new());
        }
        let gate = operator.apply(a.unwrap_or(false), b.unwrap_or(false));

        if !props.bool("pulse").unwrap_or(false) {
            state.last_gate = Some(gate);
            return Ok(NodeOutput::new().set("result", gate));
        }

        let now = ctx.now();
        let rising = gate && !state.last_gate.unwrap_or(false);
        state.last_gate = Some(gate);
        if rising {
            state.pulse_until = Some(add_millis(now, pulse_ms(props)));
        }
        let active = state.pulse_until.is_some_and(|until| now < until);
        if !active {
            state.pulse_until = None;
        }
        Ok(NodeOutput::new().set("result", active))
    }

    fn validate(props: &Properties<'_>) -> Result<(), Vec<String>> {
        Self::operator(props)
            .map(|_| ())
            .map_err(|err| vec![err.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use flowhub_domain::id::NodeId;
    use flowhub_domain::value::Value;

    use super::*;

    fn props(operator: &str, pulse: bool) -> BTreeMap<String, Value> {
        let mut props = LogicNode::schema().resolve_properties(&BTreeMap::new());
        props.insert("operator".to_string(), Value::from(operator));
        props.insert("pulse".to_string(), Value::Bool(pulse));
        props
    }

    fn run(
        props: &BTreeMap<String, Value>,
        state: &mut LogicState,
        at: Timestamp,
        a: Option<bool>,
        b: Option<bool>,
    ) -> Option<Value> {
        let id = NodeId::from("gate");
        let ctx = NodeContext {
            node_id: &id,
            node_type: LogicNode::TYPE_ID,
            tick: 0,
            now: at,
            is_backend: true,
            warming_up: false,
        };
        let inputs = Inputs::from_pairs([("a", a.map(Value::Bool)), ("b", b.map(Value::Bool))]);
        LogicNode
            .execute(&inputs, &Properties::new(props), &ctx, state)
            .unwrap()
            .get("result")
            .cloned()
    }

    #[test]
    fn should_evaluate_every_operator() {
        let now = flowhub_domain::time::now();
        let cases = [
            ("AND", true, false, false),
            ("OR", true, false, true),
            ("XOR", true, true, false),
            ("NAND", true, true, false),
            ("NOR", false, false, true),
            ("NOT", true, true, false),
        ];
        for (op, a, b, expected) in cases {
            let result = run(&props(op, false), &mut LogicState::default(), now, Some(a), Some(b));
            assert_eq!(result, Some(Value::Bool(expected)), "{op}({a}, {b})");
        }
    }

    #[test]
    fn should_treat_single_missing_input_as_false() {
        let now = flowhub_domain::time::now();
        let result = run(&props("OR", false), &mut LogicState::default(), now, None, Some(true));
        assert_eq!(result, Some(Value::Bool(true)));
        let result = run(&props("AND", false), &mut LogicState::default(), now, None, Some(true));
        assert_eq!(result, Some(Value::Bool(false)));
    }

    #[test]
    fn should_produce_nothing_without_any_input() {
        let now = flowhub_domain::time::now();
        let result = run(&props("AND", false), &mut LogicState::default(), now, None, None);
        assert!(result.is_none());
    }

    #[test]
    fn should_pulse_on_first_true_result() {
        let props = props("OR", true);
        let mut state = LogicState::default();
        let start = flowhub_domain::time::now();
        assert_eq!(
            run(&props, &mut state, start, Some(true), None),
            Some(Value::Bool(true))
        );
        assert_eq!(
            run(&props, &mut state, add_millis(start, 400), Some(true), None),
            Some(Value::Bool(true))
        );
        assert_eq!(
            run(&props, &mut state, add_millis(start, 500), Some(true), None),
            Some(Value::Bool(false))
        );
    }

    #[test]
    fn should_pulse_again_only_after_falling_edge() {
        let props = props("OR", true);
        let mut state = LogicState::default();
        let start = flowhub_domain::time::now();
        run(&props, &mut state, start, Some(true), None);
        run(&props, &mut state, add_millis(start, 600), Some(true), None);
        assert_eq!(
            run(&props, &mut state, add_millis(start, 700), Some(false), None),
            Some(Value::Bool(false))
        );
        assert_eq!(
            run(&props, &mut state, add_millis(start, 800), Some(true), None),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn should_reject_unknown_operator() {
        let errors = LogicNode::validate(&Properties::new(&props("MAYBE", false))).unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
