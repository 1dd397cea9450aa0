mod classify;
mod session;

pub use classify::{ErrorClass, LEADER_CHANGE_MARKER, is_leader_change_message};
pub use session::{ConnectionError, NotifyError, SessionError};

/// Whether a failure is the transient "ownership moved to another context" condition that the
/// retry policy is allowed to retry.
pub trait IsLeaderChange {
    fn is_leader_change(&self) -> bool;
}

impl IsLeaderChange for String {
    fn is_leader_change(&self) -> bool {
        is_leader_change_message(self)
    }
}

impl IsLeaderChange for &str {
    fn is_leader_change(&self) -> bool {
        is_leader_change_message(self)
    }
}

impl IsLeaderChange for sqlx::Error {
    fn is_leader_change(&self) -> bool {
        match self {
            sqlx::Error::Database(db) => is_leader_change_message(db.message()),
            other => is_leader_change_message(&other.to_string()),
        }
    }
}
