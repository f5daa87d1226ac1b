use stackdraft_core::{CoreError, Timestamp, UserSub};
use stackdraft_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("locked by {locked_by} since {locked_at}")]
    Locked {
        locked_by: UserSub,
        locked_at: Timestamp,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no draft to commit on project {0}")]
    NoDraftToCommit(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The caller-facing classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Locked,
    NotFound,
    Forbidden,
    InvalidInput,
    StorageFailure,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Locked { .. } => ErrorKind::Locked,
            Self::NotFound(_) | Self::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidInput(_) | Self::NoDraftToCommit(_) | Self::Config(_) => {
                ErrorKind::InvalidInput
            }
            Self::Storage(_) | Self::Core(_) => ErrorKind::StorageFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_draft_is_invalid_input() {
        let err = EngineError::NoDraftToCommit("p".into());
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn backend_failures_are_storage_failures() {
        let err = EngineError::from(StorageError::Unavailable("disk".into()));
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }

    #[test]
    fn lock_error_names_the_holder() {
        let err = EngineError::Locked {
            locked_by: UserSub::from("alice"),
            locked_at: Timestamp::from_millis(1_000),
        };
        assert_eq!(err.to_string(), "locked by alice since 1000ms");
    }
}
