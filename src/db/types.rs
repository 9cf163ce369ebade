use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Scheduling state of a test. The stored value caches
/// [`crate::core::time::live_status`] and is reconciled by the status sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "test_status", rename_all = "lowercase")]
pub(crate) enum TestStatus {
    Upcoming,
    Ongoing,
    Completed,
}

impl TestStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
    Forfeited,
    /// Kept for rows written by older clients; new forfeits use `Forfeited` + `blocked`.
    Blocked,
}

impl AttemptStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::Forfeited => "forfeited",
            Self::Blocked => "blocked",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UserRole {
    Student,
    Faculty,
}
