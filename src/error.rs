use thiserror::Error;

/// Error types for the collaboration coordinator
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Room and participant errors
    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Participant {0} not found")]
    ParticipantNotFound(String),

    #[error("Not authorized to {0}")]
    Unauthorized(String),

    /// Request errors
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Judge errors
    #[error("External service failure: {0}")]
    ExternalServiceFailure(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using CoordinatorError
pub type Result<T> = std::result::Result<T, CoordinatorError>;

impl CoordinatorError {
    pub fn internal(msg: impl Into<String>) -> Self {
        CoordinatorError::Internal(msg.into())
    }

    pub fn unauthorized(action: impl Into<String>) -> Self {
        CoordinatorError::Unauthorized(action.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        CoordinatorError::MalformedRequest(reason.into())
    }

    pub fn external(reason: impl Into<String>) -> Self {
        CoordinatorError::ExternalServiceFailure(reason.into())
    }

    /// Stable code sent to clients in `Error` notices
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::RoomNotFound(_) => "room_not_found",
            CoordinatorError::ParticipantNotFound(_) => "participant_not_found",
            CoordinatorError::Unauthorized(_) => "unauthorized",
            CoordinatorError::MalformedRequest(_) | CoordinatorError::SerializationFailed(_) => {
                "malformed_request"
            }
            CoordinatorError::ExternalServiceFailure(_) => "external_service_failure",
            CoordinatorError::Timeout(_) => "timeout",
            CoordinatorError::InvalidConfiguration(_) => "invalid_configuration",
            CoordinatorError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordinatorError::RoomNotFound("ABCD".to_string());
        assert_eq!(err.to_string(), "Room ABCD not found");

        let err = CoordinatorError::unauthorized("change the language");
        assert_eq!(err.to_string(), "Not authorized to change the language");
    }

    #[test]
    fn test_error_helpers() {
        let err = CoordinatorError::internal("Something went wrong");
        assert!(matches!(err, CoordinatorError::Internal(_)));

        let err = CoordinatorError::external("judge unreachable");
        assert!(matches!(err, CoordinatorError::ExternalServiceFailure(_)));
    }

    #[test]
    fn test_serde_errors_are_malformed_requests() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CoordinatorError = parse_err.into();
        assert_eq!(err.code(), "malformed_request");
        assert_eq!(CoordinatorError::malformed("missing room_id").code(), "malformed_request");
    }
}
