use super::IsLeaderChange;
use super::classify::{ErrorClass, is_leader_change_message};
use thiserror::Error as ThisError;

/// The connection factory could not produce a working handle.
///
/// `Clone` so a single failed construction can reject every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("Connection error: {message}")]
pub struct ConnectionError {
    message: String,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, ThisError)]
pub enum NotifyError {
    #[error("broadcast channel `{0}` is closed")]
    Closed(String),

    #[error("failed to encode change event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::Connection(_) => ErrorClass::Connection,
            other if other.is_leader_change() => ErrorClass::TransientLeaderChange,
            _ => ErrorClass::Operation,
        }
    }
}

impl IsLeaderChange for SessionError {
    fn is_leader_change(&self) -> bool {
        match self {
            SessionError::DatabaseError(e) => e.is_leader_change(),
            // The worker may surface an engine failure it could not map to a typed error.
            SessionError::RactorError(message) | SessionError::UnexpectedError(message) => {
                is_leader_change_message(message)
            }
            SessionError::Connection(_)
            | SessionError::JsonError(_)
            | SessionError::Notify(_)
            | SessionError::InvalidInput(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_never_transient() {
        let err = SessionError::from(ConnectionError::new("leader changed during open"));
        assert_eq!(err.class(), ErrorClass::Connection);
        assert!(!err.is_leader_change());
    }

    #[test]
    fn unexpected_engine_message_is_classified() {
        let err = SessionError::UnexpectedError("Leader changed, aborting".to_string());
        assert_eq!(err.class(), ErrorClass::TransientLeaderChange);

        let err = SessionError::UnexpectedError("disk I/O error".to_string());
        assert_eq!(err.class(), ErrorClass::Operation);
    }

    #[test]
    fn invalid_input_is_an_operation_error() {
        let err = SessionError::InvalidInput("name is required".to_string());
        assert_eq!(err.class(), ErrorClass::Operation);
    }
}
