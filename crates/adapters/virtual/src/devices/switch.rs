//! Virtual switch: on/off only, colour data is ignored.

use std::sync::{Mutex, MutexGuard, PoisonError};

use flowhub_domain::action::PendingAction;
use flowhub_domain::entity::EntityState;
use flowhub_domain::id::EntityId;

use super::Transition;
use crate::error::VirtualError;

#[derive(Debug)]
struct Status {
    state: EntityState,
    available: bool,
}

/// A simulated switch that can be turned on and off.
#[derive(Debug)]
pub struct VirtualSwitch {
    entity_id: EntityId,
    friendly_name: String,
    status: Mutex<Status>,
}

impl VirtualSwitch {
    #[must_use]
    pub fn new(entity_id: EntityId, friendly_name: impl Into<String>) -> Self {
        Self {
            entity_id,
            friendly_name: friendly_name.into(),
            status: Mutex::new(Status {
                state: EntityState::Off,
                available: true,
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

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    pub(crate) fn apply(&self, action: &PendingAction) -> Result<Option<Transition>, VirtualError> {
        let mut status = self.lock_available()?;
        let old_state = status.state;
        status.state = EntityState::from(action.turn_on);
        Ok((old_state != status.state).then(|| Transition {
            old_state,
            new_state: status.state,
            attributes: serde_json::Value::Null,
        }))
    }

    pub(crate) fn toggle(&self) -> Result<Transition, VirtualError> {
        let mut status = self.lock_available()?;
        let old_state = status.state;
        status.state = EntityState::from(old_state != EntityState::On);
        Ok(Transition {
            old_state,
            new_state: status.state,
            attributes: serde_json::Value::Null,
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
