//! Persistence seams for tests and attempts.
//!
//! Services never read-then-write rows themselves. Every mutation goes through a
//! closure that the store runs against the locked current row, so two writers on
//! the same test or attempt serialize and a failing closure leaves the row as it was.

pub(crate) mod attempts;
#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod postgres;
pub(crate) mod test_windows;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::errors::ProctorError;
use crate::db::models::{Attempt, Test};

pub(crate) use postgres::PgStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Mutation applied to a locked test row. Returns the row to persist.
pub(crate) type TestMutation<'a> = &'a (dyn Fn(&Test) -> Result<Test, ProctorError> + Send + Sync);

/// Precondition run on a locked test row before it is deleted.
pub(crate) type TestCheck<'a> = &'a (dyn Fn(&Test) -> Result<(), ProctorError> + Send + Sync);

/// Mutation applied in place to a locked attempt row.
pub(crate) type AttemptMutation<'a> =
    &'a (dyn Fn(&mut Attempt) -> Result<(), ProctorError> + Send + Sync);

/// Check run against every prior attempt of the same student on the same test
/// while the pair is locked, oldest first.
pub(crate) type AttemptGuard<'a> =
    &'a (dyn Fn(&[Attempt]) -> Result<(), ProctorError> + Send + Sync);

/// Tests whose audience contains any of `audience` tags, or that are owned by
/// `faculty_id`. An empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestFilter {
    pub(crate) audience: Vec<String>,
    pub(crate) faculty_id: Option<String>,
}

impl TestFilter {
    pub(crate) fn is_empty(&self) -> bool {
        self.audience.is_empty() && self.faculty_id.is_none()
    }

    pub(crate) fn matches(&self, test: &Test) -> bool {
        if self.is_empty() {
            return true;
        }

        let owned = self.faculty_id.as_deref().is_some_and(|faculty| faculty == test.faculty_id);
        owned || audience_tags(&test.audience).any(|tag| self.audience.iter().any(|want| want == tag))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum DeleteOutcome {
    Deleted(Test),
    Missing,
    Referenced,
}

/// Distinct trimmed non-empty tags of a comma-delimited audience, in order.
pub(crate) fn audience_tags(audience: &str) -> impl Iterator<Item = &str> {
    let mut seen: Vec<&str> = Vec::new();
    audience.split(',').map(str::trim).filter(move |tag| {
        if tag.is_empty() || seen.contains(tag) {
            return false;
        }
        seen.push(*tag);
        true
    })
}

#[async_trait]
pub(crate) trait TestStore: Send + Sync {
    async fn insert(&self, test: &Test) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Test>, StoreError>;

    async fn list(&self, filter: &TestFilter) -> Result<Vec<Test>, StoreError>;

    /// Applies `mutation` to the locked row and persists its result.
    /// `TestNotFound` when the row does not exist.
    async fn update_with(&self, id: &str, mutation: TestMutation<'_>) -> Result<Test, ProctorError>;

    /// Runs `check` on the locked row, then deletes it unless attempts reference it.
    async fn delete_checked(
        &self,
        id: &str,
        check: TestCheck<'_>,
    ) -> Result<DeleteOutcome, ProctorError>;

    /// Both bulk status transitions evaluated against the same `now`. Returns
    /// the rows that actually changed.
    async fn sweep_statuses(&self, now: OffsetDateTime) -> Result<Vec<Test>, StoreError>;

    /// Claims every status change made at or after `cutoff` that has not been
    /// announced yet, marking it announced at `now`.
    async fn claim_status_notifications(
        &self,
        now: OffsetDateTime,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<Test>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    /// Inserts `attempt` after `guard` accepted the student's prior attempts.
    async fn create_checked(
        &self,
        attempt: &Attempt,
        guard: AttemptGuard<'_>,
    ) -> Result<(), ProctorError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Attempt>, StoreError>;

    /// Applies `mutation` to the locked row and persists it.
    /// `AttemptNotFound` when the row does not exist.
    async fn modify(&self, id: &str, mutation: AttemptMutation<'_>) -> Result<Attempt, ProctorError>;
}
