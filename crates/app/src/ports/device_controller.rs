//! Device-controller port: how the dispatcher reaches real devices.
//!
//! Retry policy, if any, belongs to the implementation; the dispatcher calls
//! each action exactly once.

use std::future::Future;

use flowhub_domain::action::PendingAction;
use flowhub_domain::error::FlowHubError;

/// Executes device-control requests.
pub trait DeviceController: Send + Sync + 'static {
    /// Apply `action` to its target entity.
    fn control_device(
        &self,
        action: &PendingAction,
    ) -> impl Future<Output = Result<(), FlowHubError>> + Send;
}

impl<T: DeviceController> DeviceController for std::sync::Arc<T> {
    fn control_device(
        &self,
        action: &PendingAction,
    ) -> impl Future<Output = Result<(), FlowHubError>> + Send {
        (**self).control_device(action)
    }
}
