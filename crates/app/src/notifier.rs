//! Notification rate limiter: dedup and throttling for human-facing alerts.
//!
//! Device transitions (`<name> turned ON|OFF`) are dropped when the device
//! is already known to be in that state and the previous message for it is
//! younger than the per-device interval. Identical text for the same device
//! inside that interval is dropped too. Alerts skip both checks. Everything
//! that survives passes the global throttle: sent now if the interval since
//! the last send has elapsed and nothing is waiting, queued (FIFO) otherwise.

use std::collections::{HashMap, VecDeque};

use flowhub_domain::notification::{MessageKind, NotificationEvent};
use flowhub_domain::time::{Timestamp, millis_between};

pub const DEFAULT_GLOBAL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_PER_DEVICE_INTERVAL_MS: u64 = 10_000;

/// Result of [`NotificationLimiter::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Deliver now.
    Send(NotificationEvent),
    /// Deferred by the global throttle; released by [`NotificationLimiter::drain`].
    Queued,
    /// Device already in the announced state.
    Unchanged,
    /// Same text for the same device too soon.
    Duplicate,
}

#[derive(Debug, Clone)]
struct DeviceMemory {
    on: Option<bool>,
    text: String,
    at: Timestamp,
}

#[derive(Debug)]
pub struct NotificationLimiter {
    global_interval_ms: i64,
    per_device_interval_ms: i64,
    last_sent: Option<Timestamp>,
    devices: HashMap<String, DeviceMemory>,
    queue: VecDeque<NotificationEvent>,
}

impl Default for NotificationLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_INTERVAL_MS, DEFAULT_PER_DEVICE_INTERVAL_MS)
    }
}

impl NotificationLimiter {
    #[must_use]
    pub fn new(global_interval_ms: u64, per_device_interval_ms: u64) -> Self {
        Self {
            global_interval_ms: i64::try_from(global_interval_ms).unwrap_or(i64::MAX),
            per_device_interval_ms: i64::try_from(per_device_interval_ms).unwrap_or(i64::MAX),
            last_sent: None,
            devices: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn submit(&mut self, event: NotificationEvent, now: Timestamp) -> Admission {
        let kind = event.kind();
        if kind != MessageKind::Alert {
            if let Some(key) = event.device_key() {
                if let Some(rejection) = self.check_device(&key, &kind, &event.text, now) {
                    tracing::debug!(device = %key, text = %event.text, ?rejection, "notification suppressed");
                    return rejection;
                }
                let on = match kind {
                    MessageKind::DeviceTransition { on, .. } => Some(on),
                    MessageKind::Alert | MessageKind::Info => None,
                };
                let previous = self.devices.get(&key).and_then(|memory| memory.on);
                self.devices.insert(
                    key,
                    DeviceMemory {
                        on: on.or(previous),
                        text: event.text.clone(),
                        at: now,
                    },
                );
            }
        }

        if self.queue.is_empty() && self.global_open(now) {
            self.last_sent = Some(now);
            Admission::Send(event)
        } else {
            self.queue.push_back(event);
            Admission::Queued
        }
    }

    /// Release the oldest queued message if the global interval allows it.
    pub fn drain(&mut self, now: Timestamp) -> Option<NotificationEvent> {
        if self.queue.is_empty() || !self.global_open(now) {
            return None;
        }
        let event = self.queue.pop_front()?;
        self.last_sent = Some(now);
        Some(event)
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn global_open(&self, now: Timestamp) -> bool {
        self.last_sent
            .is_none_or(|last| millis_between(last, now) >= self.global_interval_ms)
    }

    fn check_device(
        &self,
        key: &str,
        kind: &MessageKind,
        text: &str,
        now: Timestamp,
    ) -> Option<Admission> {
        let memory = self.devices.get(key)?;
        if millis_between(memory.at, now) >= self.per_device_interval_ms {
            return None;
        }
        if let MessageKind::DeviceTransition { on, .. } = kind {
            if memory.on == Some(*on) {
                return Some(Admission::Unchanged);
            }
        }
        (memory.text == text).then_some(Admission::Duplicate)
    }
}

#[cfg(test)]
mod tests {
    use flowhub_domain::time::add_millis;

    use super::*;

    #[test]
    fn should_suppress_repeat_inside_device_interval_and_allow_after() {
        let mut limiter = NotificationLimiter::default();
        let t0 = flowhub_domain::time::now();
        let event = || NotificationEvent::new("Kitchen Light turned ON");

        assert!(matches!(limiter.submit(event(), t0), Admission::Send(_)));
        assert_eq!(limiter.submit(event(), add_millis(t0, 5_000)), Admission::Unchanged);
        assert!(matches!(
            limiter.submit(event(), add_millis(t0, 11_000)),
            Admission::Send(_)
        ));
    }

    #[test]
    fn should_announce_state_flip_immediately_after_global_interval() {
        let mut limiter = NotificationLimiter::default();
        let t0 = flowhub_domain::time::now();
        limiter.submit(NotificationEvent::new("Desk turned ON"), t0);
        let admission = limiter.submit(NotificationEvent::new("Desk turned OFF"), add_millis(t0, 2_500));
        assert!(matches!(admission, Admission::Send(_)));
    }

    #[test]
    fn should_queue_behind_global_throttle_in_arrival_order() {
        let mut limiter = NotificationLimiter::default();
        let t0 = flowhub_domain::time::now();
        limiter.submit(NotificationEvent::new("A turned ON"), t0);
        assert_eq!(
            limiter.submit(NotificationEvent::new("B turned ON"), add_millis(t0, 100)),
            Admission::Queued
        );
        assert_eq!(
            limiter.submit(NotificationEvent::new("C turned ON"), add_millis(t0, 200)),
            Admission::Queued
        );
        assert_eq!(limiter.queued(), 2);

        assert!(limiter.drain(add_millis(t0, 1_000)).is_none());
        assert_eq!(limiter.drain(add_millis(t0, 2_000)).unwrap().text, "B turned ON");
        assert!(limiter.drain(add_millis(t0, 3_000)).is_none());
        assert_eq!(limiter.drain(add_millis(t0, 4_000)).unwrap().text, "C turned ON");
        assert!(limiter.drain(add_millis(t0, 9_000)).is_none());
    }

    #[test]
    fn should_not_jump_the_queue() {
        let mut limiter = NotificationLimiter::default();
        let t0 = flowhub_domain::time::now();
        limiter.submit(NotificationEvent::new("A turned ON"), t0);
        limiter.submit(NotificationEvent::new("B turned ON"), add_millis(t0, 100));
        assert_eq!(
            limiter.submit(NotificationEvent::new("C turned ON"), add_millis(t0, 5_000)),
            Admission::Queued
        );
    }

    #[test]
    fn should_let_repeated_alerts_through_the_device_check() {
        let mut limiter = NotificationLimiter::default();
        let t0 = flowhub_domain::time::now();
        let alert = || NotificationEvent::for_device("Error: failed to control light.a", "light.a");
        assert!(matches!(limiter.submit(alert(), t0), Admission::Send(_)));
        assert_eq!(limiter.submit(alert(), add_millis(t0, 100)), Admission::Queued);
        assert_eq!(limiter.drain(add_millis(t0, 2_000)), Some(alert()));
    }

    #[test]
    fn should_drop_identical_info_for_same_device() {
        let mut limiter = NotificationLimiter::default();
        let t0 = flowhub_domain::time::now();
        let info = || NotificationEvent::for_device("Battery at 20%", "sensor.door");
        limiter.submit(info(), t0);
        assert_eq!(limiter.submit(info(), add_millis(t0, 3_000)), Admission::Duplicate);
        assert_eq!(
            limiter.submit(
                NotificationEvent::for_device("Battery at 15%", "sensor.door"),
                add_millis(t0, 3_000)
            ),
            Admission::Send(NotificationEvent::for_device("Battery at 15%", "sensor.door"))
        );
    }
}
