//! Lifecycle of a single student's attempt at a test.
//!
//! Terminal transitions (submit, forfeit) all run inside [`AttemptStore::modify`]
//! and re-check `in_progress` against the locked row, so a submit racing the
//! third violation resolves to exactly one of them.

use std::sync::Arc;

use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::errors::ProctorError;
use crate::core::security::{normalize_email, Identity};
use crate::db::models::{AnswerSlot, Attempt, Question};
use crate::db::types::AttemptStatus;
use crate::repositories::{AttemptStore, TestStore};
use crate::services::grading;
use crate::services::notifier::Notifications;

/// Violations that forfeit an attempt.
pub(crate) const MAX_VIOLATIONS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnswerInput {
    pub(crate) question_index: u32,
    pub(crate) selected_index: Option<u32>,
}

/// Prior attempts of one student on one test, oldest first. A blocked attempt
/// anywhere in the history or a finished latest attempt forbids a new one.
fn check_reattempt(prior: &[Attempt]) -> Result<(), ProctorError> {
    let blocked = prior.iter().any(|attempt| attempt.blocked);
    let finished = prior.last().is_some_and(|attempt| attempt.status.is_terminal());

    if blocked || finished {
        Err(ProctorError::AlreadyAttemptedOrBlocked)
    } else {
        Ok(())
    }
}

fn ensure_in_progress(attempt: &Attempt) -> Result<(), ProctorError> {
    if attempt.status == AttemptStatus::InProgress {
        Ok(())
    } else {
        Err(ProctorError::NotInProgress)
    }
}

fn ensure_owner(attempt: &Attempt, student_email: &str) -> Result<(), ProctorError> {
    if attempt.student_email == normalize_email(student_email) {
        Ok(())
    } else {
        Err(ProctorError::Forbidden("attempt belongs to another student"))
    }
}

fn forfeit(attempt: &mut Attempt, now: OffsetDateTime) {
    attempt.status = AttemptStatus::Forfeited;
    attempt.blocked = true;
    attempt.score = None;
    attempt.submitted_at = Some(now);
    attempt.updated_at = now;
}

/// Overwrites the selection of every known slot. Slots whose selection is
/// unchanged keep their timestamp, so replaying a payload changes nothing.
pub(crate) fn merge_answers(
    slots: &mut [AnswerSlot],
    answers: &[AnswerInput],
    now: OffsetDateTime,
) -> bool {
    let mut changed = false;

    for answer in answers {
        let Some(slot) = slots.iter_mut().find(|slot| slot.question_index == answer.question_index)
        else {
            continue;
        };
        if slot.selected_index != answer.selected_index {
            slot.selected_index = answer.selected_index;
            slot.updated_at = Some(now);
            changed = true;
        }
    }

    changed
}

fn empty_slots(questions: &[Question]) -> Vec<AnswerSlot> {
    (0..questions.len() as u32)
        .map(|question_index| AnswerSlot { question_index, selected_index: None, updated_at: None })
        .collect()
}

#[derive(Clone)]
pub(crate) struct Attempts {
    tests: Arc<dyn TestStore>,
    attempts: Arc<dyn AttemptStore>,
    notifications: Notifications,
}

impl Attempts {
    pub(crate) fn new(
        tests: Arc<dyn TestStore>,
        attempts: Arc<dyn AttemptStore>,
        notifications: Notifications,
    ) -> Self {
        Self { tests, attempts, notifications }
    }

    pub(crate) async fn start(
        &self,
        test_id: &str,
        student_email: &str,
        now: OffsetDateTime,
    ) -> Result<Attempt, ProctorError> {
        let test = self.tests.find_by_id(test_id).await?.ok_or(ProctorError::TestNotFound)?;

        let attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            test_id: test.id.clone(),
            student_email: normalize_email(student_email),
            started_at: now,
            submitted_at: None,
            duration_minutes: test.duration_minutes,
            total_marks: test.total_marks,
            answers: Json(empty_slots(&test.questions)),
            exit_count: 0,
            blocked: false,
            score: None,
            status: AttemptStatus::InProgress,
            created_at: now,
            updated_at: now,
        };

        self.attempts.create_checked(&attempt, &check_reattempt).await?;

        metrics::counter!("attempts_started_total").increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            test_id = %attempt.test_id,
            student = %attempt.student_email,
            "Attempt started"
        );

        Ok(attempt)
    }

    /// Counts one violation. `reporter` is the best identity the caller has;
    /// `None` is accepted, a different student is not.
    pub(crate) async fn record_violation(
        &self,
        attempt_id: &str,
        reporter: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Attempt, ProctorError> {
        let mutation = |attempt: &mut Attempt| -> Result<(), ProctorError> {
            if let Some(reporter) = reporter {
                ensure_owner(attempt, reporter)?;
            }
            ensure_in_progress(attempt)?;

            attempt.exit_count += 1;
            attempt.updated_at = now;
            if attempt.exit_count >= MAX_VIOLATIONS {
                forfeit(attempt, now);
            }
            Ok(())
        };
        let attempt = self.attempts.modify(attempt_id, &mutation).await?;

        metrics::counter!("attempt_violations_total").increment(1);

        if attempt.status == AttemptStatus::Forfeited {
            metrics::counter!("attempts_forfeited_total").increment(1);
            tracing::warn!(
                attempt_id = %attempt.id,
                test_id = %attempt.test_id,
                student = %attempt.student_email,
                exit_count = attempt.exit_count,
                "Attempt forfeited after repeated violations"
            );
            self.publish_score(&attempt).await;
        } else {
            tracing::info!(
                attempt_id = %attempt.id,
                exit_count = attempt.exit_count,
                "Attempt violation recorded"
            );
        }

        Ok(attempt)
    }

    pub(crate) async fn save_answers(
        &self,
        attempt_id: &str,
        student_email: &str,
        answers: &[AnswerInput],
        now: OffsetDateTime,
    ) -> Result<Attempt, ProctorError> {
        let mutation = |attempt: &mut Attempt| -> Result<(), ProctorError> {
            ensure_owner(attempt, student_email)?;
            ensure_in_progress(attempt)?;

            if merge_answers(&mut attempt.answers, answers, now) {
                attempt.updated_at = now;
            }
            Ok(())
        };

        self.attempts.modify(attempt_id, &mutation).await
    }

    /// Final transition. With `forfeit` the attempt is closed ungraded and
    /// blocked; otherwise `answers` are merged and the attempt is graded
    /// against the current answer key and the total marks captured at start.
    pub(crate) async fn submit(
        &self,
        attempt_id: &str,
        student_email: &str,
        answers: &[AnswerInput],
        forfeit_attempt: bool,
        now: OffsetDateTime,
    ) -> Result<Attempt, ProctorError> {
        let current =
            self.attempts.find_by_id(attempt_id).await?.ok_or(ProctorError::AttemptNotFound)?;
        ensure_owner(&current, student_email)?;
        ensure_in_progress(&current)?;

        let test = self.tests.find_by_id(&current.test_id).await?;
        if test.is_none() && !forfeit_attempt {
            return Err(ProctorError::TestNotFound);
        }
        let questions: &[Question] =
            test.as_ref().map(|test| test.questions.as_slice()).unwrap_or(&[]);

        let mutation = |attempt: &mut Attempt| -> Result<(), ProctorError> {
            ensure_owner(attempt, student_email)?;
            ensure_in_progress(attempt)?;

            if forfeit_attempt {
                forfeit(attempt, now);
                return Ok(());
            }

            merge_answers(&mut attempt.answers, answers, now);
            attempt.score = Some(grading::grade(questions, &attempt.answers, attempt.total_marks));
            attempt.status = AttemptStatus::Submitted;
            attempt.submitted_at = Some(now);
            attempt.updated_at = now;
            Ok(())
        };
        let attempt = self.attempts.modify(attempt_id, &mutation).await?;

        if forfeit_attempt {
            metrics::counter!("attempts_forfeited_total").increment(1);
        } else {
            metrics::counter!("attempts_submitted_total").increment(1);
        }
        tracing::info!(
            attempt_id = %attempt.id,
            test_id = %attempt.test_id,
            student = %attempt.student_email,
            status = attempt.status.as_str(),
            score = ?attempt.score,
            "Attempt closed"
        );

        let audience = test.as_ref().map_or("", |test| test.audience.as_str());
        self.notifications.score_update(&attempt, audience).await;

        Ok(attempt)
    }

    /// Readable by the owning student and by any faculty member.
    pub(crate) async fn get(
        &self,
        attempt_id: &str,
        viewer: &Identity,
    ) -> Result<Attempt, ProctorError> {
        let attempt =
            self.attempts.find_by_id(attempt_id).await?.ok_or(ProctorError::AttemptNotFound)?;

        if !viewer.is_faculty() {
            ensure_owner(&attempt, &viewer.email)?;
        }
        Ok(attempt)
    }

    async fn publish_score(&self, attempt: &Attempt) {
        let audience = match self.tests.find_by_id(&attempt.test_id).await {
            Ok(Some(test)) => test.audience,
            Ok(None) => String::new(),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    test_id = %attempt.test_id,
                    "Failed to load audience for score update"
                );
                String::new()
            }
        };
        self.notifications.score_update(attempt, &audience).await;
    }
}
