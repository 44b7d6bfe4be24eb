use thiserror::Error;
use warp::http::StatusCode;

/// Custom error types for the exam session coordinator
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Request validation errors
    #[error("Invalid or missing field: {0}")]
    InvalidArgument(String),

    /// Room registry errors
    #[error("Meeting {0} not found")]
    RoomNotFound(String),

    #[error("Room code space exhausted after {0} attempts")]
    CapacityExceeded(u32),

    #[error("Only the host may perform this operation: {0}")]
    Forbidden(String),

    /// Signaling errors
    #[error("No room code supplied")]
    MissingRoomCode,

    #[error("Meeting {0} is invalid or no longer active")]
    InvalidOrInactiveRoom(String),

    #[error("Sender has no participant record in meeting {0}")]
    NotInRoom(String),

    #[error("Only the host can start the call in meeting {0}")]
    OnlyHostCanStart(String),

    /// Assignment timing errors
    #[error("Assignment {0} not found")]
    AssignmentNotFound(u64),

    #[error("Submission {0} not found")]
    SubmissionNotFound(u64),

    #[error("No active assignment for {0}")]
    NoActiveAssignment(String),

    #[error("Time limit exceeded for assignment {0}")]
    Expired(u64),

    /// Submission integrity errors
    #[error("Too many executions, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Execution collaborator errors
    #[error("Code execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Convenience type alias for Results using CoordinatorError
pub type Result<T> = std::result::Result<T, CoordinatorError>;

impl CoordinatorError {
    /// Helper to create InvalidArgument errors with a field name
    pub fn invalid(field: impl Into<String>) -> Self {
        CoordinatorError::InvalidArgument(field.into())
    }

    /// Short machine-readable code carried in `meeting-error` signals
    /// and HTTP error bodies.
    pub fn wire_code(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidArgument(_) => "invalid_argument",
            CoordinatorError::RoomNotFound(_) => "not_found",
            CoordinatorError::CapacityExceeded(_) => "capacity_exceeded",
            CoordinatorError::Forbidden(_) => "forbidden",
            CoordinatorError::MissingRoomCode => "missing_code",
            CoordinatorError::InvalidOrInactiveRoom(_) => "invalid_or_inactive",
            CoordinatorError::NotInRoom(_) => "not_in_room",
            CoordinatorError::OnlyHostCanStart(_) => "only_host_can_start",
            CoordinatorError::AssignmentNotFound(_) => "assignment_not_found",
            CoordinatorError::SubmissionNotFound(_) => "submission_not_found",
            CoordinatorError::NoActiveAssignment(_) => "no_active_assignment",
            CoordinatorError::Expired(_) => "time_limit_exceeded",
            CoordinatorError::RateLimited { .. } => "rate_limited",
            CoordinatorError::ExecutionFailed(_) => "execution_failed",
            CoordinatorError::SerializationFailed(_) => "serialization_failed",
        }
    }

    /// HTTP status each error surfaces as at the API boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            CoordinatorError::InvalidArgument(_) | CoordinatorError::MissingRoomCode => {
                StatusCode::BAD_REQUEST
            }
            CoordinatorError::RoomNotFound(_)
            | CoordinatorError::AssignmentNotFound(_)
            | CoordinatorError::SubmissionNotFound(_)
            | CoordinatorError::InvalidOrInactiveRoom(_) => StatusCode::NOT_FOUND,
            CoordinatorError::Forbidden(_)
            | CoordinatorError::NotInRoom(_)
            | CoordinatorError::OnlyHostCanStart(_)
            | CoordinatorError::NoActiveAssignment(_)
            | CoordinatorError::Expired(_) => StatusCode::FORBIDDEN,
            CoordinatorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoordinatorError::CapacityExceeded(_)
            | CoordinatorError::ExecutionFailed(_)
            | CoordinatorError::SerializationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordinatorError::RoomNotFound("AB2CD3".to_string());
        assert_eq!(err.to_string(), "Meeting AB2CD3 not found");
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(CoordinatorError::MissingRoomCode.wire_code(), "missing_code");
        assert_eq!(
            CoordinatorError::OnlyHostCanStart("AB2CD3".into()).wire_code(),
            "only_host_can_start"
        );
        assert_eq!(
            CoordinatorError::InvalidOrInactiveRoom("AB2CD3".into()).wire_code(),
            "invalid_or_inactive"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CoordinatorError::RateLimited { retry_after_secs: 30 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(CoordinatorError::Expired(7).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            CoordinatorError::invalid("timeLimitSec").status(),
            StatusCode::BAD_REQUEST
        );
    }
}
