//! Command correlator: attributes observed state changes to their cause.
//!
//! Every dispatched command is remembered per entity for the correlation
//! window; a state change for that entity inside the window is attributed
//! to the command (`"self, confirmed"`), anything else is attributed from the
//! platform's context metadata. Both kinds of record go to the durable
//! [`RecordLog`] and to a bounded in-memory history.

use std::collections::{HashMap, VecDeque};

use flowhub_domain::action::PendingAction;
use flowhub_domain::id::EntityId;
use flowhub_domain::record::{
    Attribution, CORRELATION_WINDOW_MS, CommandRecord, LogRecord, ObservedStateChange,
    PendingCommand, SourceDetails, StateChangeRecord,
};
use flowhub_domain::time::{Timestamp, millis_between};

use crate::ports::RecordLog;

/// Records kept in memory for history queries.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

pub struct CommandCorrelator<L> {
    log: L,
    recent: HashMap<EntityId, CommandRecord>,
    history: VecDeque<LogRecord>,
    capacity: usize,
    window_ms: u64,
}

impl<L: RecordLog> CommandCorrelator<L> {
    #[must_use]
    pub fn new(log: L) -> Self {
        Self {
            log,
            recent: HashMap::new(),
            history: VecDeque::with_capacity(DEFAULT_HISTORY_CAPACITY),
            capacity: DEFAULT_HISTORY_CAPACITY,
            window_ms: CORRELATION_WINDOW_MS,
        }
    }

    #[must_use]
    pub fn with_window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    /// Bound the in-memory history; values below 1 are raised to 1.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self
    }

    /// Remember a command about to be sent, replacing any pending one for
    /// the same entity.
    pub fn record_command(&mut self, action: &PendingAction, now: Timestamp) -> CommandRecord {
        self.expire(now);
        let record = CommandRecord::from_action(action, now);
        if let Some(previous) = self.recent.insert(record.entity_id.clone(), record.clone()) {
            tracing::debug!(
                entity_id = %record.entity_id,
                replaced_node = %previous.node_id,
                "pending command replaced"
            );
        }
        self.persist(LogRecord::Outgoing(record.clone()));
        record
    }

    /// Forget the pending command for `entity_id`; no confirmation will come.
    pub fn record_failure(&mut self, entity_id: &EntityId) -> Option<CommandRecord> {
        self.recent.remove(entity_id)
    }

    /// Attribute an observed state change and log it.
    pub fn record_state_change(
        &mut self,
        change: &ObservedStateChange,
        now: Timestamp,
    ) -> StateChangeRecord {
        self.expire(now);
        let (source, details) = match self.recent.remove(&change.entity_id) {
            Some(command) => {
                let latency = millis_between(command.timestamp, now);
                (
                    Attribution::SelfConfirmed,
                    SourceDetails::confirmed(&command, latency),
                )
            }
            None => (
                change.context.attribute(),
                SourceDetails::external(&change.context),
            ),
        };
        tracing::debug!(
            entity_id = %change.entity_id,
            old_state = %change.old_state,
            new_state = %change.new_state,
            %source,
            "state change attributed"
        );
        let record = StateChangeRecord::new(change, now, source, details);
        self.persist(LogRecord::Incoming(record.clone()));
        record
    }

    /// Most recent records first, optionally for one entity only.
    #[must_use]
    pub fn history(&self, entity_id: Option<&EntityId>, limit: usize) -> Vec<LogRecord> {
        self.history
            .iter()
            .rev()
            .filter(|record| entity_id.is_none_or(|id| record.entity_id() == id))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Commands still inside the correlation window, by entity id.
    pub fn pending_commands(&mut self, now: Timestamp) -> Vec<PendingCommand> {
        self.expire(now);
        let mut pending: Vec<PendingCommand> = self
            .recent
            .values()
            .map(|record| PendingCommand {
                entity_id: record.entity_id.clone(),
                action: record.action,
                age_ms: millis_between(record.timestamp, now),
                node_type: record.node_type.clone(),
                reason: record.reason.clone(),
            })
            .collect();
        pending.sort_by(|a, b| a.entity_id.as_str().cmp(b.entity_id.as_str()));
        pending
    }

    fn expire(&mut self, now: Timestamp) {
        let window = i64::try_from(self.window_ms).unwrap_or(i64::MAX);
        self.recent
            .retain(|_, record| millis_between(record.timestamp, now) < window);
    }

    fn persist(&mut self, record: LogRecord) {
        if let Err(err) = self.log.append(&record) {
            tracing::warn!(%err, entity_id = %record.entity_id(), "failed to write command log");
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

impl<L> std::fmt::Debug for CommandCorrelator<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCorrelator")
            .field("pending", &self.recent.len())
            .field("history", &self.history.len())
            .field("capacity", &self.capacity)
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}
