//! Node schemas: declared sockets and typed property defaults.

use std::collections::BTreeMap;

use flowhub_domain::value::{SocketType, Value};

/// A named, typed input or output socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSpec {
    pub name: &'static str,
    pub socket_type: SocketType,
}

/// A named, typed property with its default value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub value_type: SocketType,
    pub default: Value,
}

/// Inputs, outputs and properties of a node type, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSchema {
    pub inputs: Vec<SocketSpec>,
    pub outputs: Vec<SocketSpec>,
    pub properties: Vec<PropertySpec>,
}

impl NodeSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn input(mut self, name: &'static str, socket_type: SocketType) -> Self {
        self.inputs.push(SocketSpec { name, socket_type });
        self
    }

    #[must_use]
    pub fn output(mut self, name: &'static str, socket_type: SocketType) -> Self {
        self.outputs.push(SocketSpec { name, socket_type });
        self
    }

    #[must_use]
    pub fn property(
        mut self,
        name: &'static str,
        value_type: SocketType,
        default: impl Into<Value>,
    ) -> Self {
        self.properties.push(PropertySpec {
            name,
            value_type,
            default: default.into(),
        });
        self
    }

    #[must_use]
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|s| s.name == name)
    }

    #[must_use]
    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|s| s.name == name)
    }

    /// Declared defaults overlaid with `overrides`.
    ///
    /// Unknown keys in `overrides` are kept so that forward-compatible
    /// documents survive a round trip.
    #[must_use]
    pub fn resolve_properties(&self, overrides: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut resolved: BTreeMap<String, Value> = self
            .properties
            .iter()
            .map(|p| (p.name.to_string(), p.default.clone()))
            .collect();
        resolved.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        resolved
    }

    /// Type-check resolved properties against their declared types.
    #[must_use]
    pub fn type_errors(&self, properties: &BTreeMap<String, Value>) -> Vec<String> {
        self.properties
            .iter()
            .filter_map(|spec| {
                let value = properties.get(spec.name)?;
                (!spec.value_type.accepts(value))
                    .then(|| format!("{} must be of type {:?}", spec.name, spec.value_type))
            })
            .collect()
    }
}
