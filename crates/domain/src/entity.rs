//! Entity: an externally owned, observable/controllable device aspect
//! (a light's on/off state, a switch, …) addressed by [`EntityId`](crate::id::EntityId).

mod state;

pub use state::EntityState;

/// Attribute keys worth keeping on an incoming state-change record.
///
/// Everything else a device reports (friendly names, supported features,
/// icons) is noise for causal attribution.
pub const SIGNIFICANT_ATTRIBUTES: &[&str] = &[
    "brightness",
    "color_mode",
    "hs_color",
    "rgb_color",
    "color_temp",
    "color_temp_kelvin",
];

/// Keep only the [`SIGNIFICANT_ATTRIBUTES`] of an attribute object.
///
/// Non-object inputs yield an empty map.
#[must_use]
pub fn significant_attributes(
    attributes: &serde_json::Value,
) -> serde_json::Map<String, serde_json::Value> {
    attributes
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| SIGNIFICANT_ATTRIBUTES.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}
