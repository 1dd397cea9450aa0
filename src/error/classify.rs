//! Failure classification.
//!
//! The storage engine reports a leader migration only through the wording of its error message.
//! Every decision about "is this the transient leader-change condition" goes through
//! [`is_leader_change_message`]; swap its body for a structured code check if the engine ever
//! exposes one.

/// Substring (compared case-insensitively) the engine uses when session ownership moved to a
/// different context while an operation was executing.
pub const LEADER_CHANGE_MARKER: &str = "leader changed";

/// Coarse failure taxonomy of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The worker could not be started or the storage could not be opened.
    Connection,
    /// Ownership moved mid-operation; retried by the retry policy.
    TransientLeaderChange,
    /// Anything else. Never retried.
    Operation,
}

pub fn is_leader_change_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains(LEADER_CHANGE_MARKER)
}
