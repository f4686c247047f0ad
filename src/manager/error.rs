use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    // Initialization errors
    #[error("Manager initialization failed: {reason}")]
    InitializationFailed {
        reason: String,
        component: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("API server failed to start on {address}: {reason}")]
    ApiServerStartFailed {
        address: String,
        reason: String,
        #[source]
        source: std::io::Error,
    },

    // Request errors
    #[error("No {rule_kind} rules supplied for service '{service}'")]
    EmptyPayload { service: String, rule_kind: String },

    #[error("Service '{name}' already exists")]
    ServiceAlreadyExists { name: String },

    #[error("Invalid service definition: {reason}")]
    InvalidService { field: String, reason: String },

    // Storage consistency errors
    #[error("Unexpected storage result during {operation}")]
    UnexpectedResult { operation: String },
}

impl ManagerError {
    // Helper constructors
    pub fn initialization_failed(reason: impl Into<String>, component: impl Into<String>) -> Self {
        Self::InitializationFailed {
            reason: reason.into(),
            component: component.into(),
            source: None,
        }
    }

    pub fn empty_payload(service: impl Into<String>, rule_kind: impl Into<String>) -> Self {
        Self::EmptyPayload {
            service: service.into(),
            rule_kind: rule_kind.into(),
        }
    }

    pub fn invalid_service(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidService {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unexpected_result(operation: impl Into<String>) -> Self {
        Self::UnexpectedResult {
            operation: operation.into(),
        }
    }

    // Check if the caller supplied bad input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyPayload { .. }
                | Self::ServiceAlreadyExists { .. }
                | Self::InvalidService { .. }
        )
    }
}
