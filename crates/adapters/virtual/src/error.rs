//! Virtual integration error types.

use flowhub_domain::error::FlowHubError;
use flowhub_domain::id::EntityId;

#[derive(Debug, thiserror::Error)]
pub enum VirtualError {
    #[error("{entity_id} is unavailable")]
    Unavailable { entity_id: EntityId },
}

impl From<VirtualError> for FlowHubError {
    fn from(err: VirtualError) -> Self {
        FlowHubError::Storage(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_into_storage_error() {
        let err = VirtualError::Unavailable {
            entity_id: EntityId::new("light.desk").unwrap(),
        };
        assert_eq!(err.to_string(), "light.desk is unavailable");
        assert!(matches!(FlowHubError::from(err), FlowHubError::Storage(_)));
    }
}
