use thiserror::Error;

use crate::models::TaskId;

/// Failure modes of the hosted task service, as seen by the client.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Transient failure (network down, timeout, 5xx). Callers should keep
    /// the operation queued and retry.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// Permanent rejection (bad payload, 4xx). Callers must roll back and
    /// surface the message, never retry.
    #[error("remote rejected the operation: {0}")]
    Rejected(String),

    /// Update or delete of an id the service does not know.
    #[error("task {0} not found on the remote service")]
    NotFound(TaskId),
}

impl RemoteError {
    /// Whether the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// Input problems caught before a mutation ever reaches the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("invalid due date: {0}")]
    BadDueDate(String),

    #[error("suggestion prompt must not be empty")]
    EmptyPrompt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Unavailable("connect refused".into()).is_transient());
        assert!(!RemoteError::Rejected("bad payload".into()).is_transient());
        assert!(!RemoteError::NotFound(TaskId::from("t1")).is_transient());
    }
}
