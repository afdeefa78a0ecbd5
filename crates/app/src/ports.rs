//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the engine core and the outside world.
//! They are defined here (in `app`) so that both the engine and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod clock;
pub mod device_controller;
pub mod record_log;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device_controller::DeviceController;
pub use record_log::{MemoryRecordLog, RecordLog};
