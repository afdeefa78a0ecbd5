//! Notification events: human-facing alerts derived from state changes and errors.

use serde::{Deserialize, Serialize};

/// A message on its way to users (UI broadcast, chat bot, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl NotificationEvent {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            device_id: None,
        }
    }

    #[must_use]
    pub fn for_device(text: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            device_id: Some(device_id.into()),
        }
    }

    /// `"<name> turned ON"` / `"<name> turned OFF"`.
    #[must_use]
    pub fn transition(name: &str, on: bool, device_id: impl Into<String>) -> Self {
        let state = if on { "ON" } else { "OFF" };
        Self::for_device(format!("{name} turned {state}"), device_id)
    }

    /// Device key used for per-device throttling: the explicit device id, or
    /// the name parsed from a transition message.
    #[must_use]
    pub fn device_key(&self) -> Option<String> {
        self.device_id.clone().or_else(|| match self.kind() {
            MessageKind::DeviceTransition { name, .. } => Some(name),
            MessageKind::Alert | MessageKind::Info => None,
        })
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        classify(&self.text)
    }
}

/// What a free-text message is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// `<name> turned ON|OFF`.
    DeviceTransition { name: String, on: bool },
    /// Error or warning text.
    Alert,
    Info,
}

/// Classify a message by pattern.
#[must_use]
pub fn classify(text: &str) -> MessageKind {
    let trimmed = text.trim();
    if let Some((name, state)) = trimmed.rsplit_once(" turned ") {
        let on = match state.trim() {
            s if s.eq_ignore_ascii_case("on") => Some(true),
            s if s.eq_ignore_ascii_case("off") => Some(false),
            _ => None,
        };
        if let Some(on) = on {
            if !name.trim().is_empty() {
                return MessageKind::DeviceTransition {
                    name: name.trim().to_string(),
                    on,
                };
            }
        }
    }
    let lower = trimmed.to_lowercase();
    if ["error", "warning", "failed"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        MessageKind::Alert
    } else {
        MessageKind::Info
    }
}
