//! Numeric threshold comparison with optional hysteresis.
//!
//! Once `>`/`>=` is true it stays true until the value drops below
//! `threshold - hysteresis` (mirrored for `<`/`<=`).

use flowhub_domain::value::SocketType;

use crate::node::{Inputs, Node, NodeContext, NodeError, NodeOutput, NodeSchema, Properties};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl Operator {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterOrEqual),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessOrEqual),
            "==" | "=" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareState {
    last: Option<bool>,
}

#[derive(Debug, Default)]
pub struct CompareNode;

impl CompareNode {
    fn operator(props: &Properties<'_>) -> Result<Operator, NodeError> {
        let raw = props.str("operator").unwrap_or(">");
        Operator::parse(raw).ok_or_else(|| NodeError::InvalidProperty {
            name: "operator".to_string(),
            reason: format!("unknown operator {raw:?}"),
        })
    }
}

impl Node for CompareNode {
    const TYPE_ID: &'static str = "compare";
    type State = CompareState;

    fn schema() -> NodeSchema {
        NodeSchema::new()
            .input("value", SocketType::Number)
            .output("result", SocketType::Boolean)
            .property("operator", SocketType::String, ">")
            .property("threshold", SocketType::Number, 0.0)
            .property("hysteresis", SocketType::Number, 0.0)
    }

    fn execute(
        &self,
        inputs: &Inputs,
        props: &Properties<'_>,
        _ctx: &NodeContext<'_>,
        state: &mut CompareState,
    ) -> Result<NodeOutput, NodeError> {
        let operator = Self::operator(props)?;
        let Some(value) = inputs.number("value") else {
            return Ok(NodeOutput::new());
        };
        let threshold = props.number("threshold").unwrap_or(0.0);
        let band = props.number("hysteresis").unwrap_or(0.0).abs();
        let held = state.last.unwrap_or(false);

        let result = match operator {
            Operator::Greater if held => value > threshold - band,
            Operator::GreaterOrEqual if held => value >= threshold - band,
            Operator::Less if held => value < threshold + band,
            Operator::LessOrEqual if held => value <= threshold + band,
            Operator::Greater => value > threshold,
            Operator::GreaterOrEqual => value >= threshold,
            Operator::Less => value < threshold,
            Operator::LessOrEqual => value <= threshold,
            Operator::Equal => (value - threshold).abs() <= f64::EPSILON,
            Operator::NotEqual => (value - threshold).abs() > f64::EPSILON,
        };
        state.last = Some(result);
        Ok(NodeOutput::new().set("result", result))
    }

    fn validate(props: &Properties<'_>) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(err) = Self::operator(props) {
            errors.push(err.to_string());
        }
        if props.number("hysteresis").is_some_and(|h| h < 0.0) {
            errors.push("hysteresis must not be negative".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use flowhub_domain::id::NodeId;
    use flowhub_domain::value::Value;

    use super::*;

    fn run(props: &BTreeMap<String, Value>, state: &mut CompareState, value: Option<f64>) -> Option<Value> {
        let id = NodeId::from("cmp");
        let ctx = NodeContext {
            node_id: &id,
            node_type: CompareNode::TYPE_ID,
            tick: 0,
            now: flowhub_domain::time::now(),
            is_backend: true,
            warming_up: false,
        };
        let inputs = Inputs::from_pairs([("value", value.map(Value::Number))]);
        CompareNode
            .execute(&inputs, &Properties::new(props), &ctx, state)
            .unwrap()
            .get("result")
            .cloned()
    }

    fn props(operator: &str, threshold: f64, hysteresis: f64) -> BTreeMap<String, Value> {
        let mut props = BTreeMap::new();
        props.insert("operator".to_string(), Value::from(operator));
        props.insert("threshold".to_string(), Value::Number(threshold));
        props.insert("hysteresis".to_string(), Value::Number(hysteresis));
        props
    }

    #[test]
    fn should_compare_against_threshold() {
        let mut state = CompareState::default();
        let props = props("<", 20.0, 0.0);
        assert_eq!(run(&props, &mut state, Some(19.0)), Some(Value::Bool(true)));
        assert_eq!(run(&props, &mut state, Some(21.0)), Some(Value::Bool(false)));
    }

    #[test]
    fn should_hold_result_inside_hysteresis_band() {
        let mut state = CompareState::default();
        let props = props(">", 25.0, 1.0);
        assert_eq!(run(&props, &mut state, Some(24.5)), Some(Value::Bool(false)));
        assert_eq!(run(&props, &mut state, Some(25.5)), Some(Value::Bool(true)));
        assert_eq!(run(&props, &mut state, Some(24.5)), Some(Value::Bool(true)));
        assert_eq!(run(&props, &mut state, Some(23.9)), Some(Value::Bool(false)));
    }

    #[test]
    fn should_produce_nothing_without_value() {
        let mut state = CompareState::default();
        assert!(run(&props(">", 0.0, 0.0), &mut state, None).is_none());
        assert!(state.last.is_none());
    }

    #[test]
    fn should_reject_unknown_operator() {
        let errors = CompareNode::validate(&Properties::new(&props("~", 0.0, -1.0))).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
