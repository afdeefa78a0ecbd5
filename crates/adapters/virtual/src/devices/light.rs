//! Virtual light: on/off plus brightness and colour attributes.
//!
//! Turning the light off clears its colour attributes; turning it on merges
//! the command's [`ColorData`] over whatever was set before.

use std::sync::{Mutex, MutexGuard, PoisonError};

use flowhub_domain::action::{ColorData, PendingAction};
use flowhub_domain::entity::EntityState;
use flowhub_domain::id::EntityId;
use serde_json::{Map, Value, json};

use super::Transition;
use crate::error::VirtualError;

const FULL_BRIGHTNESS: u8 = 255;

#[derive(Debug)]
struct Status {
    state: EntityState,
    available: bool,
    attributes: Map<String, Value>,
}

/// A simulated dimmable colour light.
#[derive(Debug)]
pub struct VirtualLight {
    entity_id: EntityId,
    friendly_name: String,
    status: Mutex<Status>,
}

impl VirtualLight {
    #[must_use]
    pub fn new(entity_id: EntityId, friendly_name: impl Into<String>) -> Self {
        Self {
            entity_id,
            friendly_name: friendly_name.into(),
            status: Mutex::new(Status {
                state: EntityState::Off,
                available: true,
                attributes: Map::new(),
            }),
        }
    }

    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    #[must_use]
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        self.lock().state
    }

    /// Current colour attributes (empty while off).
    #[must_use]
    pub fn attributes(&self) -> Value {
        Value::Object(self.lock().attributes.clone())
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub(crate) fn apply(&self, action: &PendingAction) -> Result<Option<Transition>, VirtualError> {
        let mut status = self.lock_available()?;
        let old_state = status.state;
        let old_attributes = status.attributes.clone();

        if action.turn_on {
            status.state = EntityState::On;
            merge_color(&mut status.attributes, action.color_data.as_ref());
        } else {
            status.state = EntityState::Off;
            status.attributes.clear();
        }

        let changed = old_state != status.state || old_attributes != status.attributes;
        Ok(changed.then(|| Transition {
            old_state,
            new_state: status.state,
            attributes: Value::Object(status.attributes.clone()),
        }))
    }

    pub(crate) fn toggle(&self) -> Result<Transition, VirtualError> {
        let mut status = self.lock_available()?;
        let old_state = status.state;
        if old_state == EntityState::On {
            status.state = EntityState::Off;
            status.attributes.clear();
        } else {
            status.state = EntityState::On;
            merge_color(&mut status.attributes, None);
        }
        Ok(Transition {
            old_state,
            new_state: status.state,
            attributes: Value::Object(status.attributes.clone()),
        })
    }

    fn lock_available(&self) -> Result<MutexGuard<'_, Status>, VirtualError> {
        let status = self.lock();
        if status.available {
            Ok(status)
        } else {
            Err(VirtualError::Unavailable {
                entity_id: self.entity_id.clone(),
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn merge_color(attributes: &mut Map<String, Value>, color: Option<&ColorData>) {
    let color = color.cloned().unwrap_or_default();

    let brightness = color
        .brightness
        .map(Value::from)
        .or_else(|| attributes.get("brightness").cloned())
        .unwrap_or_else(|| Value::from(FULL_BRIGHTNESS));
    attributes.insert("brightness".to_string(), brightness);

    // last colour space wins, as on real bulbs
    if let Some((hue, saturation)) = color.hs_color {
        attributes.insert("hs_color".to_string(), json!([hue, saturation]));
        attributes.remove("rgb_color");
        attributes.remove("color_temp_kelvin");
        attributes.insert("color_mode".to_string(), Value::from("hs"));
    } else if let Some(rgb) = color.rgb_color {
        attributes.insert("rgb_color".to_string(), json!(rgb));
        attributes.remove("hs_color");
        attributes.remove("color_temp_kelvin");
        attributes.insert("color_mode".to_string(), Value::from("rgb"));
    } else if let Some(kelvin) = color.color_temp_kelvin {
        attributes.insert("color_temp_kelvin".to_string(), Value::from(kelvin));
        attributes.remove("hs_color");
        attributes.remove("rgb_color");
        attributes.insert("color_mode".to_string(), Value::from("color_temp"));
    } else if !attributes.contains_key("color_mode") {
        attributes.insert("color_mode".to_string(), Value::from("brightness"));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use flowhub_domain::id::NodeId;

    use super::*;

    fn light() -> VirtualLight {
        VirtualLight::new(EntityId::new("light.kitchen").unwrap(), "Kitchen Light")
    }

    fn action(turn_on: bool, color_data: Option<ColorData>) -> PendingAction {
        PendingAction {
            entity_id: EntityId::new("light.kitchen").unwrap(),
            turn_on,
            color_data,
            transition_ms: 0,
            origin_node_id: NodeId::from("ctl"),
            origin_node_type: "light_control".to_string(),
            reason: "test".to_string(),
            inputs: BTreeMap::new(),
        }
    }

    #[test]
    fn should_default_to_off_without_attributes() {
        let light = light();
        assert_eq!(light.state(), EntityState::Off);
        assert_eq!(light.attributes(), json!({}));
    }

    #[test]
    fn should_turn_on_at_full_brightness() {
        let light = light();
        let transition = light.apply(&action(true, None)).unwrap().unwrap();
        assert_eq!(transition.new_state, EntityState::On);
        assert_eq!(transition.attributes["brightness"], 255);
        assert_eq!(transition.attributes["color_mode"], "brightness");
    }

    #[test]
    fn should_switch_colour_space_when_new_colour_arrives() {
        let light = light();
        light
            .apply(&action(
                true,
                Some(ColorData {
                    rgb_color: Some([255, 0, 0]),
                    ..ColorData::default()
                }),
            ))
            .unwrap();
        let transition = light
            .apply(&action(
                true,
                Some(ColorData {
                    hs_color: Some((30.0, 80.0)),
                    brightness: Some(100),
                    ..ColorData::default()
                }),
            ))
            .unwrap()
            .unwrap();

        assert_eq!(transition.old_state, EntityState::On);
        assert_eq!(transition.attributes["color_mode"], "hs");
        assert_eq!(transition.attributes["brightness"], 100);
        assert!(transition.attributes.get("rgb_color").is_none());
    }

    #[test]
    fn should_report_nothing_for_repeated_identical_command() {
        let light = light();
        light.apply(&action(true, None)).unwrap();
        assert!(light.apply(&action(true, None)).unwrap().is_none());
    }

    #[test]
    fn should_clear_attributes_when_turned_off() {
        let light = light();
        light.apply(&action(true, None)).unwrap();
        let transition = light.apply(&action(false, None)).unwrap().unwrap();
        assert_eq!(transition.new_state, EntityState::Off);
        assert_eq!(transition.attributes, json!({}));
    }

    #[test]
    fn should_toggle_from_off_to_on() {
        let light = light();
        assert_eq!(light.toggle().unwrap().new_state, EntityState::On);
    }

    #[test]
    fn should_reject_toggle_while_unavailable() {
        let light = light();
        light.set_available(false);
        assert!(light.toggle().is_err());
        light.set_available(true);
        assert!(light.toggle().is_ok());
    }
}
