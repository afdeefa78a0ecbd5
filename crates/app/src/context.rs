//! Engine context: the single owner of correlation and notification state.
//!
//! The tick loop (through the dispatcher) and the inbound telemetry path
//! both mutate the correlator; each side goes through the locks held here,
//! so the two paths are mutually excluded. Independent engines get
//! independent contexts.

use std::sync::{Arc, Mutex, PoisonError};

use flowhub_domain::action::PendingAction;
use flowhub_domain::error::FlowHubError;
use flowhub_domain::id::EntityId;
use flowhub_domain::notification::NotificationEvent;
use flowhub_domain::record::{
    CommandRecord, LogRecord, ObservedStateChange, PendingCommand, StateChangeRecord,
};
use flowhub_domain::time::Timestamp;
use tokio::sync::broadcast;

use crate::correlator::CommandCorrelator;
use crate::notification_bus::NotificationBus;
use crate::notifier::{Admission, NotificationLimiter};
use crate::ports::{Clock, RecordLog};

pub struct EngineContext<L> {
    correlator: Mutex<CommandCorrelator<L>>,
    limiter: Mutex<NotificationLimiter>,
    bus: NotificationBus,
    clock: Arc<dyn Clock>,
    notifications_enabled: bool,
}

impl<L: RecordLog> EngineContext<L> {
    #[must_use]
    pub fn new(
        correlator: CommandCorrelator<L>,
        limiter: NotificationLimiter,
        bus: NotificationBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            correlator: Mutex::new(correlator),
            limiter: Mutex::new(limiter),
            bus,
            clock,
            notifications_enabled: true,
        }
    }

    #[must_use]
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Subscribe to notifications that passed the rate limiter.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.bus.subscribe()
    }

    /// Log a command that is about to be sent to its device.
    pub fn record_dispatch(&self, action: &PendingAction) -> CommandRecord {
        let now = self.now();
        self.correlator().record_command(action, now)
    }

    /// Forget the pending command and raise an error notification.
    pub fn record_dispatch_failure(&self, action: &PendingAction, err: &FlowHubError) {
        self.correlator().record_failure(&action.entity_id);
        self.notify(NotificationEvent::for_device(
            format!("Error: failed to control {}: {err}", action.entity_id),
            action.entity_id.as_str(),
        ));
    }

    /// Attribute an externally observed state change, and announce on/off flips.
    pub fn ingest_state_change(&self, change: &ObservedStateChange) -> StateChangeRecord {
        let now = self.now();
        let record = self.correlator().record_state_change(change, now);

        if let Some(on) = change.new_state.as_bool() {
            if change.old_state.as_bool() != Some(on) {
                let name = change
                    .friendly_name
                    .as_deref()
                    .unwrap_or(change.entity_id.as_str());
                self.notify(NotificationEvent::transition(
                    name,
                    on,
                    change.entity_id.as_str(),
                ));
            }
        }
        record
    }

    /// Run `event` through the rate limiter and emit it if admitted now.
    pub fn notify(&self, event: NotificationEvent) {
        if !self.notifications_enabled {
            return;
        }
        let now = self.now();
        let admission = self.limiter().submit(event, now);
        if let Admission::Send(event) = admission {
            self.bus.emit(event);
        }
    }

    /// Emit the next queued notification if the global throttle allows it.
    pub fn flush_notifications(&self) {
        let now = self.now();
        let released = self.limiter().drain(now);
        if let Some(event) = released {
            self.bus.emit(event);
        }
    }

    #[must_use]
    pub fn history(&self, entity_id: Option<&EntityId>, limit: usize) -> Vec<LogRecord> {
        self.correlator().history(entity_id, limit)
    }

    #[must_use]
    pub fn pending_commands(&self) -> Vec<PendingCommand> {
        let now = self.now();
        self.correlator().pending_commands(now)
    }

    fn correlator(&self) -> std::sync::MutexGuard<'_, CommandCorrelator<L>> {
        self.correlator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn limiter(&self) -> std::sync::MutexGuard<'_, NotificationLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L> std::fmt::Debug for EngineContext<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("notifications_enabled", &self.notifications_enabled)
            .finish_non_exhaustive()
    }
}
