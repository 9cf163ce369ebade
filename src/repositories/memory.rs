//! In-process store used by service and API tests. One mutex guards both maps,
//! which gives every operation the same all-or-nothing shape as a Postgres
//! transaction.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::core::errors::ProctorError;
use crate::db::models::{Attempt, Test};
use crate::db::types::TestStatus;

use super::{
    AttemptGuard, AttemptMutation, AttemptStore, DeleteOutcome, StoreError, TestFilter,
    TestCheck, TestMutation, TestStore,
};

#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    tests: HashMap<String, Test>,
    attempts: HashMap<String, Attempt>,
    /// Insertion order, standing in for `created_at, id` ordering.
    attempt_order: Vec<String>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.tables().attempts.len()
    }

    /// Overwrites a test row as-is, bypassing validation and status stamping.
    pub(crate) fn put_test(&self, test: Test) {
        self.tables().tests.insert(test.id.clone(), test);
    }
}

#[async_trait]
impl TestStore for MemoryStore {
    async fn insert(&self, test: &Test) -> Result<(), StoreError> {
        self.tables().tests.insert(test.id.clone(), test.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Test>, StoreError> {
        Ok(self.tables().tests.get(id).cloned())
    }

    async fn list(&self, filter: &TestFilter) -> Result<Vec<Test>, StoreError> {
        let tables = self.tables();
        let mut tests: Vec<Test> =
            tables.tests.values().filter(|test| filter.matches(test)).cloned().collect();
        tests.sort_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tests)
    }

    async fn update_with(&self, id: &str, mutation: TestMutation<'_>) -> Result<Test, ProctorError> {
        let mut tables = self.tables();
        let current = tables.tests.get(id).ok_or(ProctorError::TestNotFound)?;
        let updated = mutation(current)?;
        tables.tests.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_checked(
        &self,
        id: &str,
        check: TestCheck<'_>,
    ) -> Result<DeleteOutcome, ProctorError> {
        let mut tables = self.tables();
        let Some(current) = tables.tests.get(id) else {
            return Ok(DeleteOutcome::Missing);
        };
        check(current)?;

        if tables.attempts.values().any(|attempt| attempt.test_id == id) {
            return Ok(DeleteOutcome::Referenced);
        }

        Ok(tables.tests.remove(id).map_or(DeleteOutcome::Missing, DeleteOutcome::Deleted))
    }

    async fn sweep_statuses(&self, now: OffsetDateTime) -> Result<Vec<Test>, StoreError> {
        let mut tables = self.tables();
        let mut changed = Vec::new();

        for test in tables.tests.values_mut() {
            if test.status == TestStatus::Upcoming && test.start_at <= now && now < test.end_at {
                test.status = TestStatus::Ongoing;
                test.status_changed_at = Some(now);
                test.updated_at = now;
                changed.push(test.clone());
            }
        }
        for test in tables.tests.values_mut() {
            if test.status != TestStatus::Completed && test.end_at <= now {
                test.status = TestStatus::Completed;
                test.status_changed_at = Some(now);
                test.updated_at = now;
                changed.push(test.clone());
            }
        }

        Ok(changed)
    }

    async fn claim_status_notifications(
        &self,
        now: OffsetDateTime,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<Test>, StoreError> {
        let mut tables = self.tables();
        let mut claimed = Vec::new();

        for test in tables.tests.values_mut() {
            let Some(changed_at) = test.status_changed_at else {
                continue;
            };
            let pending = test.status_notified_at.map_or(true, |notified| notified < changed_at);
            if changed_at >= cutoff && pending {
                test.status_notified_at = Some(now);
                claimed.push(test.clone());
            }
        }

        claimed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(claimed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn create_checked(
        &self,
        attempt: &Attempt,
        guard: AttemptGuard<'_>,
    ) -> Result<(), ProctorError> {
        let mut tables = self.tables();
        let prior: Vec<Attempt> = tables
            .attempt_order
            .iter()
            .filter_map(|id| tables.attempts.get(id))
            .filter(|existing| {
                existing.test_id == attempt.test_id
                    && existing.student_email == attempt.student_email
            })
            .cloned()
            .collect();
        guard(&prior)?;

        tables.attempt_order.push(attempt.id.clone());
        tables.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(self.tables().attempts.get(id).cloned())
    }

    async fn modify(&self, id: &str, mutation: AttemptMutation<'_>) -> Result<Attempt, ProctorError> {
        let mut tables = self.tables();
        let current = tables.attempts.get(id).ok_or(ProctorError::AttemptNotFound)?;

        let mut working = current.clone();
        mutation(&mut working)?;

        tables.attempts.insert(id.to_string(), working.clone());
        Ok(working)
    }
}
