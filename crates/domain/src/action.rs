//! Pending actions: device-control requests emitted by nodes.
//!
//! A [`PendingAction`] is produced by a node's `execute`, collected into the
//! tick's batch and consumed exactly once by the dispatcher. It is never
//! stored on the node.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{EntityId, NodeId};
use crate::value::Value;

/// On/off verb derived from a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAction {
    TurnOn,
    TurnOff,
}

impl From<bool> for DeviceAction {
    fn from(turn_on: bool) -> Self {
        if turn_on { Self::TurnOn } else { Self::TurnOff }
    }
}

impl std::fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TurnOn => f.write_str("turn_on"),
            Self::TurnOff => f.write_str("turn_off"),
        }
    }
}

/// Optional colour settings sent along with a turn-on command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hs_color: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgb_color: Option<[u8; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp_kelvin: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

impl ColorData {
    /// Interpret a socket value as colour data. Non-object values yield `None`.
    ///
    /// # Errors
    ///
    /// Fails when an object carries out-of-range or mistyped fields, such as
    /// a brightness above 255 or a fractional RGB component.
    pub fn from_value(value: &Value) -> Result<Option<Self>, serde_json::Error> {
        match value {
            Value::Object(json) if json.is_object() => {
                serde_json::from_value(json.clone()).map(Some)
            }
            _ => Ok(None),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A device-control request waiting for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub entity_id: EntityId,
    pub turn_on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_data: Option<ColorData>,
    pub transition_ms: u64,
    pub origin_node_id: NodeId,
    pub origin_node_type: String,
    pub reason: String,
    /// Snapshot of the emitting node's realized inputs, filled in by the scheduler.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

impl PendingAction {
    #[must_use]
    pub fn action(&self) -> DeviceAction {
        DeviceAction::from(self.turn_on)
    }

    /// JSON payload describing what is sent to the device.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "turnOn": self.turn_on,
            "colorData": self.color_data,
            "transitionMs": self.transition_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(turn_on: bool) -> PendingAction {
        PendingAction {
            entity_id: EntityId::new("light.kitchen").unwrap(),
            turn_on,
            color_data: None,
            transition_ms: 500,
            origin_node_id: NodeId::from("ctl-1"),
            origin_node_type: "light_control".to_string(),
            reason: "trigger rose".to_string(),
            inputs: BTreeMap::new(),
        }
    }

    #[test]
    fn should_display_action_verb() {
        assert_eq!(action(true).action().to_string(), "turn_on");
        assert_eq!(action(false).action().to_string(), "turn_off");
    }

    #[test]
    fn should_parse_color_data_from_object_value() {
        let value = Value::Object(serde_json::json!({"hsColor": [30.0, 80.0], "brightness": 128}));
        let color = ColorData::from_value(&value).unwrap().unwrap();
        assert_eq!(color.hs_color, Some((30.0, 80.0)));
        assert_eq!(color.brightness, Some(128));
        assert!(color.rgb_color.is_none());
    }

    #[test]
    fn should_ignore_non_object_color_values() {
        assert!(ColorData::from_value(&Value::Bool(true)).unwrap().is_none());
    }

    #[test]
    fn should_reject_out_of_range_color_fields() {
        let bright = Value::Object(serde_json::json!({"brightness": 300}));
        assert!(ColorData::from_value(&bright).is_err());
        let fractional = Value::Object(serde_json::json!({"rgbColor": [255.5, 0, 0]}));
        assert!(ColorData::from_value(&fractional).is_err());
    }

    #[test]
    fn should_describe_payload_with_transition() {
        let payload = action(true).payload();
        assert_eq!(payload["turnOn"], true);
        assert_eq!(payload["transitionMs"], 500);
        assert!(payload["colorData"].is_null());
    }
}
