//! Error types for analytics artifact synchronization

use thiserror::Error;

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Synchronization errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("Property server error: {0}")]
    PropertyServer(String),

    #[error("User {user} is not authorized to {operation}")]
    UserNotAuthorized { user: String, operation: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl SyncError {
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// True for failures raised by the repository itself (server or authorization)
    pub fn is_repository_failure(&self) -> bool {
        matches!(
            self,
            SyncError::PropertyServer(_) | SyncError::UserNotAuthorized { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_message() {
        let err = SyncError::invalid_parameter("identifier", "must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'identifier': must not be empty"
        );
        assert!(!err.is_repository_failure());
    }

    #[test]
    fn test_repository_failures() {
        assert!(SyncError::PropertyServer("down".into()).is_repository_failure());
        let err = SyncError::UserNotAuthorized {
            user: "bob".into(),
            operation: "create relationship".into(),
        };
        assert!(err.is_repository_failure());
    }
}
