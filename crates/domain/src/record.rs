//! Command and state-change records: the append-only correlation log.
//!
//! Every issued command becomes a [`CommandRecord`] (`"type": "OUTGOING"`),
//! every externally observed transition a [`StateChangeRecord`]
//! (`"type": "INCOMING"`) carrying the attributed cause.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::{DeviceAction, PendingAction};
use crate::entity::{EntityState, significant_attributes};
use crate::id::{EntityId, NodeId};
use crate::time::Timestamp;
use crate::value::Value;

/// How long after a command a matching state change still counts as its effect.
pub const CORRELATION_WINDOW_MS: u64 = 10_000;

/// Value written to the `source` field of outgoing records.
pub const OUTGOING_SOURCE: &str = "graph";

/// Log entry for a command issued by a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub timestamp: Timestamp,
    pub entity_id: EntityId,
    pub action: DeviceAction,
    pub source: String,
    pub node_id: NodeId,
    pub node_type: String,
    pub reason: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

impl CommandRecord {
    #[must_use]
    pub fn from_action(action: &PendingAction, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            entity_id: action.entity_id.clone(),
            action: action.action(),
            source: OUTGOING_SOURCE.to_string(),
            node_id: action.origin_node_id.clone(),
            node_type: action.origin_node_type.clone(),
            reason: action.reason.clone(),
            payload: action.payload(),
            inputs: action.inputs.clone(),
        }
    }
}

/// The cause attributed to an incoming state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribution {
    #[serde(rename = "self, confirmed")]
    SelfConfirmed,
    #[serde(rename = "external user")]
    ExternalUser,
    #[serde(rename = "external automation")]
    ExternalAutomation,
    #[serde(rename = "external device/integration")]
    ExternalIntegration,
    #[serde(rename = "unknown")]
    Unknown,
}

impl std::fmt::Display for Attribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SelfConfirmed => "self, confirmed",
            Self::ExternalUser => "external user",
            Self::ExternalAutomation => "external automation",
            Self::ExternalIntegration => "external device/integration",
            Self::Unknown => "unknown",
        })
    }
}

/// Context metadata the device platform attaches to a state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ExternalContext {
    /// Attribute a change that matched no recent command.
    #[must_use]
    pub fn attribute(&self) -> Attribution {
        if self.user_id.is_some() {
            Attribution::ExternalUser
        } else if self.parent_id.is_some() {
            Attribution::ExternalAutomation
        } else if self.id.is_some() {
            Attribution::ExternalIntegration
        } else {
            Attribution::Unknown
        }
    }
}

/// Extra detail explaining an [`Attribution`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl SourceDetails {
    /// Details for a change confirmed as the effect of `command`.
    #[must_use]
    pub fn confirmed(command: &CommandRecord, latency_ms: i64) -> Self {
        Self {
            node_id: Some(command.node_id.clone()),
            node_type: Some(command.node_type.clone()),
            reason: Some(command.reason.clone()),
            latency_ms: Some(latency_ms),
            ..Self::default()
        }
    }

    /// Details copied from the platform context.
    #[must_use]
    pub fn external(context: &ExternalContext) -> Self {
        Self {
            user_id: context.user_id.clone(),
            parent_id: context.parent_id.clone(),
            context_id: context.id.clone(),
            ..Self::default()
        }
    }
}

/// A state transition as reported by the device platform, before attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedStateChange {
    pub entity_id: EntityId,
    pub old_state: EntityState,
    pub new_state: EntityState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default)]
    pub context: ExternalContext,
}

/// Log entry for an observed state change with its attributed cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeRecord {
    pub timestamp: Timestamp,
    pub entity_id: EntityId,
    pub old_state: EntityState,
    pub new_state: EntityState,
    pub source: Attribution,
    pub source_details: SourceDetails,
    pub external_context: ExternalContext,
    pub significant_attributes: serde_json::Map<String, serde_json::Value>,
}

impl StateChangeRecord {
    #[must_use]
    pub fn new(
        change: &ObservedStateChange,
        timestamp: Timestamp,
        source: Attribution,
        source_details: SourceDetails,
    ) -> Self {
        Self {
            timestamp,
            entity_id: change.entity_id.clone(),
            old_state: change.old_state,
            new_state: change.new_state,
            source,
            source_details,
            external_context: change.context.clone(),
            significant_attributes: significant_attributes(&change.attributes),
        }
    }
}

/// One line of the correlation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogRecord {
    #[serde(rename = "OUTGOING")]
    Outgoing(CommandRecord),
    #[serde(rename = "INCOMING")]
    Incoming(StateChangeRecord),
}

impl LogRecord {
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::Outgoing(r) => &r.entity_id,
            Self::Incoming(r) => &r.entity_id,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Outgoing(r) => r.timestamp,
            Self::Incoming(r) => r.timestamp,
        }
    }
}

/// Query view of a command still awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCommand {
    pub entity_id: EntityId,
    pub action: DeviceAction,
    pub age_ms: i64,
    pub node_type: String,
    pub reason: String,
}
