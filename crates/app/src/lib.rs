//! # flowhub-app
//!
//! Engine core: everything between the graph document and the devices.
//!
//! ## Responsibilities
//! - Define the **node runtime contract** (`Node`, `NodeRegistry`) and ship
//!   the built-in node types
//! - Evaluate the graph tick by tick in dependency order (`Engine`)
//! - Dispatch pending actions off the tick path (`Dispatcher`)
//! - Correlate commands with observed state changes (`CommandCorrelator`)
//! - Deduplicate and throttle notifications (`NotificationLimiter`)
//! - Define **port traits** adapters implement:
//!   - `DeviceController`: send a command to a device
//!   - `RecordLog`: durable sink for the correlation log
//!   - `Clock`: the engine's only source of time
//!
//! ## Dependency rule
//! Depends on `flowhub-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod context;
pub mod correlator;
pub mod dispatcher;
pub mod node;
pub mod nodes;
pub mod notification_bus;
pub mod notifier;
pub mod ports;
pub mod scheduler;
pub mod tick_loop;
