use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::core::errors::ProctorError;
use crate::db::models::{Attempt, Test};

use super::{
    attempts, test_windows, AttemptGuard, AttemptMutation, AttemptStore, DeleteOutcome,
    StoreError, TestFilter, TestCheck, TestMutation, TestStore,
};

/// Postgres-backed store for both tests and attempts.
#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TestStore for PgStore {
    async fn insert(&self, test: &Test) -> Result<(), StoreError> {
        test_windows::insert(&self.pool, test).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Test>, StoreError> {
        Ok(test_windows::find_by_id(&self.pool, id).await?)
    }

    async fn list(&self, filter: &TestFilter) -> Result<Vec<Test>, StoreError> {
        Ok(test_windows::list(&self.pool, filter).await?)
    }

    async fn update_with(&self, id: &str, mutation: TestMutation<'_>) -> Result<Test, ProctorError> {
        let mut tx = self.pool.begin().await?;

        let current =
            test_windows::lock_by_id(&mut *tx, id).await?.ok_or(ProctorError::TestNotFound)?;
        let updated = mutation(&current)?;

        test_windows::save(&mut *tx, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_checked(
        &self,
        id: &str,
        check: TestCheck<'_>,
    ) -> Result<DeleteOutcome, ProctorError> {
        let mut tx = self.pool.begin().await?;

        let Some(current) = test_windows::lock_by_id(&mut *tx, id).await? else {
            return Ok(DeleteOutcome::Missing);
        };
        check(&current)?;

        if attempts::exists_for_test(&mut *tx, id).await? {
            return Ok(DeleteOutcome::Referenced);
        }

        test_windows::delete_by_id(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(DeleteOutcome::Deleted(current))
    }

    async fn sweep_statuses(&self, now: OffsetDateTime) -> Result<Vec<Test>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut changed = test_windows::mark_started(&mut *tx, now).await?;
        changed.extend(test_windows::mark_completed(&mut *tx, now).await?);

        tx.commit().await?;
        Ok(changed)
    }

    async fn claim_status_notifications(
        &self,
        now: OffsetDateTime,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<Test>, StoreError> {
        Ok(test_windows::claim_unannounced(&self.pool, now, cutoff).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn create_checked(
        &self,
        attempt: &Attempt,
        guard: AttemptGuard<'_>,
    ) -> Result<(), ProctorError> {
        let mut tx = self.pool.begin().await?;

        attempts::acquire_student_lock(&mut *tx, &attempt.test_id, &attempt.student_email).await?;
        let prior =
            attempts::list_for_student(&mut *tx, &attempt.test_id, &attempt.student_email).await?;
        guard(&prior)?;

        attempts::insert(&mut *tx, attempt).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_by_id(&self.pool, id).await?)
    }

    async fn modify(&self, id: &str, mutation: AttemptMutation<'_>) -> Result<Attempt, ProctorError> {
        let mut tx = self.pool.begin().await?;

        let mut attempt =
            attempts::lock_by_id(&mut *tx, id).await?.ok_or(ProctorError::AttemptNotFound)?;
        mutation(&mut attempt)?;

        attempts::save(&mut *tx, &attempt).await?;
        tx.commit().await?;
        Ok(attempt)
    }
}
