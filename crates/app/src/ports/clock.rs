//! Clock port: the engine's only source of time.
//!
//! Nodes read time exclusively through [`NodeContext::now`](crate::node::NodeContext::now),
//! which is backed by a [`Clock`]. Tests inject a [`ManualClock`].

use std::sync::{Arc, Mutex, PoisonError};

use flowhub_domain::time::{self, Timestamp, add_millis};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        time::now()
    }
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move time forward by `millis` milliseconds.
    pub fn advance(&self, millis: u64) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = add_millis(*current, millis);
    }

    pub fn set(&self, ts: Timestamp) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = ts;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(time::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
