use thiserror::Error;

use crate::repositories::StoreError;

/// Failure of a proctoring operation. Every variant except `Store` is an
/// expected outcome the caller can turn into a specific message.
#[derive(Debug, Error)]
pub(crate) enum ProctorError {
    #[error("duration_minutes must be a finite number greater than zero")]
    InvalidDuration,
    #[error("pass_marks must be lower than total_marks")]
    InvalidPassMarks,
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("question {index} is invalid: {reason}")]
    InvalidQuestion { index: usize, reason: &'static str },
    #[error("test not found")]
    TestNotFound,
    #[error("attempt not found")]
    AttemptNotFound,
    #[error("attempt is not in progress")]
    NotInProgress,
    #[error("test was already attempted or the student is blocked from it")]
    AlreadyAttemptedOrBlocked,
    #[error("test still has attempts and cannot be deleted")]
    TestHasAttempts,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    Forbidden,
    Internal,
}

impl ProctorError {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDuration
            | Self::InvalidPassMarks
            | Self::InvalidTimestamp(_)
            | Self::InvalidQuestion { .. } => ErrorKind::Validation,
            Self::TestNotFound | Self::AttemptNotFound => ErrorKind::NotFound,
            Self::NotInProgress | Self::AlreadyAttemptedOrBlocked | Self::TestHasAttempts => {
                ErrorKind::StateConflict
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for state conflicts.
    pub(crate) fn code(&self) -> Option<&'static str> {
        match self {
            Self::NotInProgress => Some("not_in_progress"),
            Self::AlreadyAttemptedOrBlocked => Some("already_attempted_or_blocked"),
            Self::TestHasAttempts => Some("test_has_attempts"),
            Self::InvalidDuration => Some("invalid_duration"),
            Self::InvalidPassMarks => Some("invalid_pass_marks"),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ProctorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(err))
    }
}
