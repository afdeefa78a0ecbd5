//! Virtual device implementations: light, switch.
//!
//! Each device keeps its state behind a [`Mutex`](std::sync::Mutex) so the
//! integration can be shared between the dispatcher's workers.

mod light;
mod switch;

pub use light::VirtualLight;
pub use switch::VirtualSwitch;

use flowhub_domain::action::PendingAction;
use flowhub_domain::entity::EntityState;
use flowhub_domain::id::EntityId;

use crate::error::VirtualError;

/// A state change caused by a command or a simulated external actor.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub old_state: EntityState,
    pub new_state: EntityState,
    pub attributes: serde_json::Value,
}

/// Wrapper enum for the concrete virtual device types.
pub enum VirtualDevice {
    Light(VirtualLight),
    Switch(VirtualSwitch),
}

impl VirtualDevice {
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::Light(d) => d.entity_id(),
            Self::Switch(d) => d.entity_id(),
        }
    }

    #[must_use]
    pub fn friendly_name(&self) -> &str {
        match self {
            Self::Light(d) => d.friendly_name(),
            Self::Switch(d) => d.friendly_name(),
        }
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        match self {
            Self::Light(d) => d.state(),
            Self::Switch(d) => d.state(),
        }
    }

    pub fn set_available(&self, available: bool) {
        match self {
            Self::Light(d) => d.set_available(available),
            Self::Switch(d) => d.set_available(available),
        }
    }

    /// Apply a command. `Ok(None)` when nothing observable changed.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualError::Unavailable`] while the device is offline.
    pub fn apply(&self, action: &PendingAction) -> Result<Option<Transition>, VirtualError> {
        match self {
            Self::Light(d) => d.apply(action),
            Self::Switch(d) => d.apply(action),
        }
    }

    /// Flip on/off as a wall switch or a phone app would.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualError::Unavailable`] while the device is offline.
    pub fn toggle(&self) -> Result<Transition, VirtualError> {
        match self {
            Self::Light(d) => d.toggle(),
            Self::Switch(d) => d.toggle(),
        }
    }
}
