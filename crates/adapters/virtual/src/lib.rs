//! # flowhub-adapter-virtual
//!
//! Virtual integration that provides simulated devices for testing and
//! demonstration. It implements the [`DeviceController`] port and reports
//! every resulting transition on a telemetry channel, the same way a real
//! device platform would push `state_changed` events back to the engine.
//!
//! ## Provided devices
//!
//! | Device | Entity ID | Behaviour |
//! |--------|-----------|-----------|
//! | Virtual Light | `light.virtual_light` | On/off, brightness, hs/rgb/colour temperature |
//! | Virtual Switch | `switch.virtual_switch` | On/off |
//!
//! ## Dependency rule
//!
//! Depends on `flowhub-app` (port traits) and `flowhub-domain` only.

mod devices;
mod error;

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::mpsc;

use flowhub_app::ports::DeviceController;
use flowhub_domain::action::PendingAction;
use flowhub_domain::entity::EntityState;
use flowhub_domain::error::{FlowHubError, NotFoundError, ValidationError};
use flowhub_domain::id::EntityId;
use flowhub_domain::record::{ExternalContext, ObservedStateChange};

pub use devices::{Transition, VirtualDevice, VirtualLight, VirtualSwitch};
pub use error::VirtualError;

pub const DEFAULT_LIGHT: &str = "light.virtual_light";
pub const DEFAULT_SWITCH: &str = "switch.virtual_switch";

/// Virtual integration holding simulated devices.
pub struct VirtualIntegration {
    devices: HashMap<EntityId, VirtualDevice>,
    telemetry: mpsc::UnboundedSender<ObservedStateChange>,
}

impl VirtualIntegration {
    /// Empty integration reporting transitions on `telemetry`.
    #[must_use]
    pub fn new(telemetry: mpsc::UnboundedSender<ObservedStateChange>) -> Self {
        Self {
            devices: HashMap::new(),
            telemetry,
        }
    }

    /// The default light and switch.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the default ids are non-empty.
    pub fn demo(
        telemetry: mpsc::UnboundedSender<ObservedStateChange>,
    ) -> Result<Self, ValidationError> {
        Self::new(telemetry)
            .with_light(DEFAULT_LIGHT, "Virtual Light")?
            .with_switch(DEFAULT_SWITCH, "Virtual Switch")
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEntityId`] for a blank id.
    pub fn with_light(mut self, entity_id: &str, friendly_name: &str) -> Result<Self, ValidationError> {
        let entity_id = EntityId::new(entity_id)?;
        let light = VirtualLight::new(entity_id.clone(), friendly_name);
        self.devices.insert(entity_id, VirtualDevice::Light(light));
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEntityId`] for a blank id.
    pub fn with_switch(mut self, entity_id: &str, friendly_name: &str) -> Result<Self, ValidationError> {
        let entity_id = EntityId::new(entity_id)?;
        let switch = VirtualSwitch::new(entity_id.clone(), friendly_name);
        self.devices.insert(entity_id, VirtualDevice::Switch(switch));
        Ok(self)
    }

    /// Check whether this integration owns the given entity.
    #[must_use]
    pub fn owns_entity(&self, entity_id: &EntityId) -> bool {
        self.devices.contains_key(entity_id)
    }

    #[must_use]
    pub fn state(&self, entity_id: &EntityId) -> Option<EntityState> {
        self.devices.get(entity_id).map(VirtualDevice::state)
    }

    /// Take a device offline (commands fail) or bring it back.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] for an unknown entity.
    pub fn set_available(&self, entity_id: &EntityId, available: bool) -> Result<(), NotFoundError> {
        let device = self.device(entity_id)?;
        device.set_available(available);
        tracing::info!(entity_id = %entity_id, available, "virtual device availability changed");
        Ok(())
    }

    /// Flip a device as something outside the engine would, reporting the
    /// change with the given platform `context`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowHubError::NotFound`] for an unknown entity, or the
    /// converted [`VirtualError`] while the device is unavailable.
    pub fn simulate_external_toggle(
        &self,
        entity_id: &EntityId,
        context: ExternalContext,
    ) -> Result<ObservedStateChange, FlowHubError> {
        let device = self.device(entity_id)?;
        let transition = device.toggle()?;
        Ok(self.report(device, transition, context))
    }

    fn device(&self, entity_id: &EntityId) -> Result<&VirtualDevice, NotFoundError> {
        self.devices.get(entity_id).ok_or_else(|| NotFoundError {
            entity: "Entity",
            id: entity_id.to_string(),
        })
    }

    fn report(
        &self,
        device: &VirtualDevice,
        transition: Transition,
        context: ExternalContext,
    ) -> ObservedStateChange {
        let change = ObservedStateChange {
            entity_id: device.entity_id().clone(),
            old_state: transition.old_state,
            new_state: transition.new_state,
            friendly_name: Some(device.friendly_name().to_string()),
            attributes: transition.attributes,
            context,
        };
        if self.telemetry.send(change.clone()).is_err() {
            tracing::debug!(entity_id = %change.entity_id, "telemetry receiver dropped");
        }
        change
    }

    fn control(&self, action: &PendingAction) -> Result<(), FlowHubError> {
        let device = self.device(&action.entity_id)?;
        if let Some(transition) = device.apply(action)? {
            let context = ExternalContext {
                id: Some(uuid::Uuid::new_v4().to_string()),
                ..ExternalContext::default()
            };
            self.report(device, transition, context);
        }
        Ok(())
    }
}

impl DeviceController for VirtualIntegration {
    fn control_device(
        &self,
        action: &PendingAction,
    ) -> impl Future<Output = Result<(), FlowHubError>> + Send {
        let result = self.control(action);
        async move { result }
    }
}

impl std::fmt::Debug for VirtualIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualIntegration")
            .field("devices", &self.devices.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use flowhub_domain::action::ColorData;
    use flowhub_domain::id::NodeId;
    use flowhub_domain::record::Attribution;

    use super::*;

    fn demo() -> (
        VirtualIntegration,
        mpsc::UnboundedReceiver<ObservedStateChange>,
    ) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (VirtualIntegration::demo(sender).unwrap(), receiver)
    }

    fn id(raw: &str) -> EntityId {
        EntityId::new(raw).unwrap()
    }

    fn action(entity: &str, turn_on: bool) -> PendingAction {
        PendingAction {
            entity_id: id(entity),
            turn_on,
            color_data: None,
            transition_ms: 0,
            origin_node_id: NodeId::from("ctl"),
            origin_node_type: "light_control".to_string(),
            reason: "test".to_string(),
            inputs: BTreeMap::new(),
        }
    }

    #[test]
    fn should_own_default_devices() {
        let (integration, _rx) = demo();
        assert!(integration.owns_entity(&id(DEFAULT_LIGHT)));
        assert!(integration.owns_entity(&id(DEFAULT_SWITCH)));
        assert!(!integration.owns_entity(&id("light.unknown")));
    }

    #[tokio::test]
    async fn should_turn_on_light_and_report_change() {
        let (integration, mut rx) = demo();
        let mut turn_on = action(DEFAULT_LIGHT, true);
        turn_on.color_data = Some(ColorData {
            color_temp_kelvin: Some(2700),
            ..ColorData::default()
        });

        integration.control_device(&turn_on).await.unwrap();

        assert_eq!(integration.state(&id(DEFAULT_LIGHT)), Some(EntityState::On));
        let change = rx.try_recv().unwrap();
        assert_eq!(change.old_state, EntityState::Off);
        assert_eq!(change.new_state, EntityState::On);
        assert_eq!(change.friendly_name.as_deref(), Some("Virtual Light"));
        assert_eq!(change.attributes["color_temp_kelvin"], 2700);
        assert_eq!(change.context.attribute(), Attribution::ExternalIntegration);
    }

    #[tokio::test]
    async fn should_stay_quiet_when_command_changes_nothing() {
        let (integration, mut rx) = demo();
        integration
            .control_device(&action(DEFAULT_SWITCH, false))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_entity() {
        let (integration, _rx) = demo();
        let result = integration.control_device(&action("light.ghost", true)).await;
        assert!(matches!(result, Err(FlowHubError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_fail_while_device_is_unavailable() {
        let (integration, mut rx) = demo();
        integration.set_available(&id(DEFAULT_LIGHT), false).unwrap();

        let result = integration.control_device(&action(DEFAULT_LIGHT, true)).await;
        assert!(matches!(result, Err(FlowHubError::Storage(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn should_report_external_toggle_with_given_context() {
        let (integration, mut rx) = demo();
        let context = ExternalContext {
            id: Some("ctx-1".to_string()),
            user_id: Some("alice".to_string()),
            parent_id: None,
        };
        let change = integration
            .simulate_external_toggle(&id(DEFAULT_SWITCH), context.clone())
            .unwrap();

        assert_eq!(change.new_state, EntityState::On);
        assert_eq!(change.context, context);
        assert_eq!(rx.try_recv().unwrap(), change);
    }

    #[test]
    fn should_reject_availability_change_for_unknown_entity() {
        let (integration, _rx) = demo();
        assert!(integration.set_available(&id("switch.ghost"), true).is_err());
    }

    #[test]
    fn should_keep_working_after_telemetry_receiver_is_dropped() {
        let (integration, rx) = demo();
        drop(rx);
        assert!(
            integration
                .simulate_external_toggle(&id(DEFAULT_LIGHT), ExternalContext::default())
                .is_ok()
        );
    }
}
