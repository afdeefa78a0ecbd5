//! Per-tick node I/O: realized inputs, resolved properties, produced outputs.

use std::collections::BTreeMap;

use flowhub_domain::action::PendingAction;
use flowhub_domain::value::Value;

/// Realized input sockets for one tick, in schema order.
///
/// Every declared socket is present; `None` means "no data" (unconnected, or
/// the upstream node has not produced that output).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    sockets: Vec<(String, Option<Value>)>,
}

impl Inputs {
    #[must_use]
    pub fn new(sockets: Vec<(String, Option<Value>)>) -> Self {
        Self { sockets }
    }

    /// Convenience constructor for tests and single-socket callers.
    #[must_use]
    pub fn from_pairs<const N: usize>(pairs: [(&str, Option<Value>); N]) -> Self {
        Self {
            sockets: pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.sockets
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Truthiness of an input, `None` when there is no data.
    #[must_use]
    pub fn truthy(&self, name: &str) -> Option<bool> {
        self.get(name).map(Value::truthy)
    }

    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::to_number)
    }

    /// Inputs that carry data, for logging alongside emitted actions.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.sockets
            .iter()
            .filter_map(|(name, value)| value.clone().map(|v| (name.clone(), v)))
            .collect()
    }
}

/// Read-only view over a node's resolved properties.
#[derive(Debug, Clone, Copy)]
pub struct Properties<'a> {
    map: &'a BTreeMap<String, Value>,
}

impl<'a> Properties<'a> {
    #[must_use]
    pub fn new(map: &'a BTreeMap<String, Value>) -> Self {
        Self { map }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::to_number)
    }

    #[must_use]
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(Value::truthy)
    }
}

/// What a node produced this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    /// Output sockets with data. Declared outputs absent here read as "no data".
    pub values: BTreeMap<String, Value>,
    /// Device-control requests for the dispatcher.
    pub actions: Vec<PendingAction>,
    /// Ask for another evaluation at the next tick boundary.
    pub reevaluate: bool,
}

impl NodeOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, socket: &str, value: impl Into<Value>) -> Self {
        self.values.insert(socket.to_string(), value.into());
        self
    }

    /// Set `socket` only when `value` is present.
    #[must_use]
    pub fn set_opt(mut self, socket: &str, value: Option<Value>) -> Self {
        if let Some(value) = value {
            self.values.insert(socket.to_string(), value);
        }
        self
    }

    #[must_use]
    pub fn action(mut self, action: PendingAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn get(&self, socket: &str) -> Option<&Value> {
        self.values.get(socket)
    }
}
