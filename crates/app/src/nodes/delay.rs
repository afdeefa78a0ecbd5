//! Delay node: the timer family (delay, debounce, throttle, retriggerable).
//!
//! | Mode | On trigger change | Output |
//! |---|---|---|
//! | `delay` | (re)start a timer of D holding the new value | held value once the timer elapses |
//! | `debounce` | same as `delay` | same as `delay` |
//! | `throttle` | fire now if ≥ D since the last fire, else drop | updated on fire |
//! | `retriggerable` | rising edge sets output true; any change (re)starts an off-timer | false when the off-timer elapses |
//!
//! D is `delayValue × unit`, optionally jittered by ±`randomPercent`
//! (recomputed at every timer start, never below 10 ms). Throttle has no
//! timer and uses the unjittered D.

use flowhub_domain::time::{Timestamp, add_millis};
use flowhub_domain::value::{SocketType, Value};
use rand::Rng;

use crate::node::{Inputs, Node, NodeContext, NodeError, NodeOutput, NodeSchema, Properties};

/// Smallest jittered duration.
const MIN_JITTERED_MS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Delay,
    Debounce,
    Throttle,
    Retriggerable,
}

impl Mode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "delay" => Some(Self::Delay),
            "debounce" => Some(Self::Debounce),
            "throttle" => Some(Self::Throttle),
            "retriggerable" | "retrigger" => Some(Self::Retriggerable),
            _ => None,
        }
    }
}

fn unit_multiplier(raw: &str) -> Option<f64> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ms" | "milliseconds" => Some(1.0),
        "s" | "seconds" => Some(1_000.0),
        "m" | "minutes" => Some(60_000.0),
        "h" | "hours" => Some(3_600_000.0),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Timer {
    deadline: Timestamp,
    held: Value,
    passthrough: Option<Value>,
}

/// Internal state of one delay node.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayState {
    last_trigger: Option<Value>,
    timer: Option<Timer>,
    output: Value,
    passthrough: Option<Value>,
    last_fire: Option<Timestamp>,
}

impl Default for DelayState {
    fn default() -> Self {
        Self {
            last_trigger: None,
            timer: None,
            output: Value::Bool(false),
            passthrough: None,
            last_fire: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DelayNode;

impl DelayNode {
    fn mode(props: &Properties<'_>) -> Result<Mode, NodeError> {
        let raw = props.str("mode").unwrap_or("delay");
        Mode::parse(raw).ok_or_else(|| NodeError::InvalidProperty {
            name: "mode".to_string(),
            reason: format!("unknown mode {raw:?}"),
        })
    }

    fn base_ms(props: &Properties<'_>) -> Result<f64, NodeError> {
        let unit = props.str("unit").unwrap_or("seconds");
        let multiplier = unit_multiplier(unit).ok_or_else(|| NodeError::InvalidProperty {
            name: "unit".to_string(),
            reason: format!("unknown unit {unit:?}"),
        })?;
        let value = props.number("delayValue").unwrap_or(1.0).max(0.0);
        Ok(value * multiplier)
    }

    fn jittered_ms(base: f64, props: &Properties<'_>) -> u64 {
        let percent = props.number("randomPercent").unwrap_or(0.0).clamp(0.0, 100.0);
        let ms = if percent > 0.0 {
            let offset = rand::thread_rng().gen_range(-percent..=percent);
            (base * (1.0 + offset / 100.0)).max(MIN_JITTERED_MS)
        } else {
            base
        };
        to_millis(ms)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_millis(ms: f64) -> u64 {
    ms.round().max(0.0) as u64
}

impl Node for DelayNode {
    const TYPE_ID: &'static str = "delay";
    type State = DelayState;

    fn schema() -> NodeSchema {
        NodeSchema::new()
            .input("trigger", SocketType::Any)
            .input("value", SocketType::Any)
            .output("output", SocketType::Any)
            .output("passthrough", SocketType::Any)
            .output("active", SocketType::Boolean)
            .property("mode", SocketType::String, "delay")
            .property("delayValue", SocketType::Number, 1.0)
            .property("unit", SocketType::String, "seconds")
            .property("randomPercent", SocketType::Number, 0.0)
    }

    fn execute(
        &self,
        inputs: &Inputs,
        props: &Properties<'_>,
        ctx: &NodeContext<'_>,
        state: &mut DelayState,
    ) -> Result<NodeOutput, NodeError> {
        let mode = Self::mode(props)?;
        let base = Self::base_ms(props)?;
        let now = ctx.now();

        if let Some(timer) = state.timer.take_if(|t| now >= t.deadline) {
            match mode {
                Mode::Retriggerable => state.output = Value::Bool(false),
                Mode::Delay | Mode::Debounce | Mode::Throttle => {
                    state.output = timer.held;
                    state.passthrough = timer.passthrough;
                    state.last_fire = Some(now);
                }
            }
        }

        if let Some(trigger) = inputs.get("trigger") {
            if state.last_trigger.as_ref() != Some(trigger) {
                let was_high = state.last_trigger.as_ref().is_some_and(Value::truthy);
                state.last_trigger = Some(trigger.clone());
                let value = inputs.get("value").cloned();

                match mode {
                    Mode::Delay | Mode::Debounce => {
                        state.timer = Some(Timer {
                            deadline: add_millis(now, Self::jittered_ms(base, props)),
                            held: trigger.clone(),
                            passthrough: value,
                        });
                    }
                    Mode::Throttle => {
                        let open = state
                            .last_fire
                            .is_none_or(|last| ctx.millis_since(last) >= to_millis(base));
                        if open {
                            state.output = trigger.clone();
                            state.passthrough = value;
                            state.last_fire = Some(now);
                        }
                    }
                    Mode::Retriggerable => {
                        if trigger.truthy() && !was_high {
                            state.output = Value::Bool(true);
                            state.passthrough = value;
                            state.last_fire = Some(now);
                        }
                        state.timer = Some(Timer {
                            deadline: add_millis(now, Self::jittered_ms(base, props)),
                            held: Value::Bool(false),
                            passthrough: None,
                        });
                    }
                }
            }
        }

        Ok(NodeOutput::new()
            .set("output", state.output.clone())
            .set_opt("passthrough", state.passthrough.clone())
            .set("active", state.timer.is_some()))
    }

    fn validate(props: &Properties<'_>) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(err) = Self::mode(props) {
            errors.push(err.to_string());
        }
        if let Err(err) = Self::base_ms(props) {
            errors.push(err.to_string());
        }
        if props.number("delayValue").is_some_and(|v| v < 0.0) {
            errors.push("delayValue must not be negative".to_string());
        }
        if props
            .number("randomPercent")
            .is_some_and(|p| !(0.0..=100.0).contains(&p))
        {
            errors.push("randomPercent must be between 0 and 100".to_string());
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
    use flowhub_domain::time::millis_between;

    use super::*;

    struct Harness {
        node: DelayNode,
        state: DelayState,
        props: BTreeMap<String, Value>,
        id: NodeId,
        start: Timestamp,
    }

    impl Harness {
        fn new(mode: &str, delay_ms: f64) -> Self {
            let mut props = DelayNode::schema().resolve_properties(&BTreeMap::new());
            props.insert("mode".to_string(), Value::from(mode));
            props.insert("delayValue".to_string(), Value::Number(delay_ms));
            props.insert("unit".to_string(), Value::from("ms"));
            Self {
                node: DelayNode,
                state: DelayState::default(),
                props,
                id: NodeId::from("delay-1"),
                start: flowhub_domain::time::now(),
            }
        }

        fn run(&mut self, at_ms: u64, trigger: Option<Value>, value: Option<Value>) -> NodeOutput {
            let ctx = NodeContext {
                node_id: &self.id,
                node_type: DelayNode::TYPE_ID,
                tick: at_ms,
                now: add_millis(self.start, at_ms),
                is_backend: true,
                warming_up: false,
            };
            let inputs = Inputs::from_pairs([("trigger", trigger), ("value", value)]);
            self.node
                .execute(&inputs, &Properties::new(&self.props), &ctx, &mut self.state)
                .unwrap()
        }

        /// Tick every 100ms from `from` to `to` (inclusive) holding `trigger`.
        fn hold(&mut self, from: u64, to: u64, trigger: &Value) -> Vec<(u64, Value)> {
            (from..=to)
                .step_by(100)
                .map(|t| {
                    let out = self.run(t, Some(trigger.clone()), None);
                    (t, out.get("output").cloned().unwrap())
                })
                .collect()
        }
    }

    #[test]
    fn should_output_held_value_only_after_delay_elapses() {
        let mut h = Harness::new("delay", 2_000.0);
        h.run(0, Some(Value::Bool(true)), Some(Value::Number(42.0)));
        for (t, out) in h.hold(100, 1_900, &Value::Bool(true)) {
            assert_eq!(out, Value::Bool(false), "fired early at {t}ms");
        }
        let out = h.run(2_000, Some(Value::Bool(true)), Some(Value::Number(7.0)));
        assert_eq!(out.get("output"), Some(&Value::Bool(true)));
        assert_eq!(out.get("passthrough"), Some(&Value::Number(42.0)));
        assert_eq!(out.get("active"), Some(&Value::Bool(false)));
    }

    #[test]
    fn should_fire_debounce_once_after_quiet_period() {
        let mut h = Harness::new("debounce", 1_000.0);
        let mut changes = Vec::new();
        let mut last = Value::Bool(false);
        for t in (0..=2_000).step_by(100) {
            let trigger = match t {
                0..=299 => 1.0,
                300..=599 => 2.0,
                _ => 3.0,
            };
            let out = h.run(t, Some(Value::Number(trigger)), None);
            let output = out.get("output").cloned().unwrap();
            if output != last {
                changes.push((t, output.clone()));
                last = output;
            }
        }
        assert_eq!(changes, vec![(1_600, Value::Number(3.0))]);
    }

    #[test]
    fn should_drop_throttled_triggers_inside_window() {
        let mut h = Harness::new("throttle", 1_000.0);
        let out = h.run(0, Some(Value::Number(1.0)), None);
        assert_eq!(out.get("output"), Some(&Value::Number(1.0)));
        let out = h.run(500, Some(Value::Number(2.0)), None);
        assert_eq!(out.get("output"), Some(&Value::Number(1.0)));
        let out = h.run(1_200, Some(Value::Number(3.0)), None);
        assert_eq!(out.get("output"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn should_turn_retriggerable_on_immediately_and_off_after_quiet_period() {
        let mut h = Harness::new("retriggerable", 1_000.0);
        let out = h.run(0, Some(Value::Bool(true)), None);
        assert_eq!(out.get("output"), Some(&Value::Bool(true)));
        for (t, out) in h.hold(100, 900, &Value::Bool(true)) {
            assert_eq!(out, Value::Bool(true), "released early at {t}ms");
        }
        let out = h.run(1_000, Some(Value::Bool(true)), None);
        assert_eq!(out.get("output"), Some(&Value::Bool(false)));
    }

    #[test]
    fn should_extend_retriggerable_on_every_change() {
        let mut h = Harness::new("retriggerable", 1_000.0);
        h.run(0, Some(Value::Bool(true)), None);
        h.run(600, Some(Value::Bool(false)), None);
        let out = h.run(1_200, Some(Value::Bool(false)), None);
        assert_eq!(out.get("output"), Some(&Value::Bool(true)));
        let out = h.run(1_600, Some(Value::Bool(false)), None);
        assert_eq!(out.get("output"), Some(&Value::Bool(false)));
    }

    #[test]
    fn should_ignore_missing_trigger() {
        let mut h = Harness::new("delay", 100.0);
        let out = h.run(0, None, None);
        assert_eq!(out.get("output"), Some(&Value::Bool(false)));
        assert_eq!(out.get("active"), Some(&Value::Bool(false)));
        assert!(h.state.last_trigger.is_none());
    }

    #[test]
    fn should_convert_units_to_milliseconds() {
        let mut h = Harness::new("delay", 2.0);
        h.props.insert("unit".to_string(), Value::from("seconds"));
        h.run(0, Some(Value::Bool(true)), None);
        let deadline = h.state.timer.as_ref().unwrap().deadline;
        assert_eq!(millis_between(h.start, deadline), 2_000);
    }

    #[test]
    fn should_keep_jittered_duration_within_bounds() {
        let mut h = Harness::new("delay", 1_000.0);
        h.props
            .insert("randomPercent".to_string(), Value::Number(20.0));
        for i in 0..50_u64 {
            let at = i * 10_000;
            let trigger = Value::Number(f64::from(u32::try_from(i).unwrap()));
            h.run(at, Some(trigger), None);
            let deadline = h.state.timer.as_ref().unwrap().deadline;
            let d = millis_between(add_millis(h.start, at), deadline);
            assert!((800..=1_200).contains(&d), "jittered duration {d} out of range");
        }
    }

    #[test]
    fn should_clamp_jittered_duration_to_minimum() {
        let mut h = Harness::new("delay", 1.0);
        h.props
            .insert("randomPercent".to_string(), Value::Number(50.0));
        h.run(0, Some(Value::Bool(true)), None);
        let deadline = h.state.timer.as_ref().unwrap().deadline;
        assert!(millis_between(h.start, deadline) >= 10);
    }

    #[test]
    fn should_reject_unknown_mode_and_unit() {
        let mut props = DelayNode::schema().resolve_properties(&BTreeMap::new());
        props.insert("mode".to_string(), Value::from("sometimes"));
        props.insert("unit".to_string(), Value::from("fortnights"));
        let errors = DelayNode::validate(&Properties::new(&props)).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
