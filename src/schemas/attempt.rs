use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::format_offset;
use crate::db::models::{AnswerSlot, Attempt};
use crate::db::types::AttemptStatus;
use crate::services::attempts::{AnswerInput, MAX_VIOLATIONS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct AnswerPayload {
    #[serde(alias = "questionIndex")]
    pub(crate) question_index: u32,
    #[serde(default, alias = "selectedIndex")]
    pub(crate) selected_index: Option<u32>,
}

impl From<AnswerPayload> for AnswerInput {
    fn from(payload: AnswerPayload) -> Self {
        AnswerInput {
            question_index: payload.question_index,
            selected_index: payload.selected_index,
        }
    }
}

pub(crate) fn answer_inputs(answers: &[AnswerPayload]) -> Vec<AnswerInput> {
    answers.iter().copied().map(AnswerInput::from).collect()
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswersRequest {
    #[validate(length(max = 1000, message = "too many answers in one save"))]
    pub(crate) answers: Vec<AnswerPayload>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    #[validate(length(max = 1000, message = "too many answers in one submission"))]
    pub(crate) answers: Vec<AnswerPayload>,
    #[serde(default)]
    pub(crate) forfeit: bool,
}

/// Body of a violation report. Only consulted when the caller has no
/// verified student identity.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ViolationRequest {
    #[serde(default, alias = "studentEmail")]
    pub(crate) student_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartAttemptResponse {
    pub(crate) attempt_id: String,
    pub(crate) test_id: String,
    pub(crate) started_at: String,
    pub(crate) deadline: String,
    pub(crate) duration_minutes: f64,
}

impl From<&Attempt> for StartAttemptResponse {
    fn from(attempt: &Attempt) -> Self {
        Self {
            attempt_id: attempt.id.clone(),
            test_id: attempt.test_id.clone(),
            started_at: format_offset(attempt.started_at),
            deadline: format_offset(attempt.deadline()),
            duration_minutes: attempt.duration_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationResponse {
    pub(crate) exit_count: i32,
    pub(crate) max_violations: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) blocked: bool,
}

impl From<&Attempt> for ViolationResponse {
    fn from(attempt: &Attempt) -> Self {
        Self {
            exit_count: attempt.exit_count,
            max_violations: MAX_VIOLATIONS,
            status: attempt.status,
            blocked: attempt.blocked,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveAnswersResponse {
    pub(crate) attempt_id: String,
    pub(crate) updated_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) attempt_id: String,
    pub(crate) score: Option<f64>,
    pub(crate) total_marks: f64,
    pub(crate) status: AttemptStatus,
    pub(crate) blocked: bool,
}

impl From<&Attempt> for SubmitResponse {
    fn from(attempt: &Attempt) -> Self {
        Self {
            attempt_id: attempt.id.clone(),
            score: attempt.score,
            total_marks: attempt.total_marks,
            status: attempt.status,
            blocked: attempt.blocked,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerSlotResponse {
    pub(crate) question_index: u32,
    pub(crate) selected_index: Option<u32>,
    pub(crate) updated_at: Option<String>,
}

impl From<&AnswerSlot> for AnswerSlotResponse {
    fn from(slot: &AnswerSlot) -> Self {
        Self {
            question_index: slot.question_index,
            selected_index: slot.selected_index,
            updated_at: slot.updated_at.map(format_offset),
        }
    }
}

/// Read model used by clients to rebuild their countdown. `deadline` and
/// `remaining_seconds` come from the server clock only.
#[derive(Debug, Serialize)]
pub(crate) struct AttemptSnapshot {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_email: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) duration_minutes: f64,
    pub(crate) deadline: String,
    pub(crate) remaining_seconds: i64,
    pub(crate) total_marks: f64,
    pub(crate) exit_count: i32,
    pub(crate) blocked: bool,
    pub(crate) score: Option<f64>,
    pub(crate) answers: Vec<AnswerSlotResponse>,
}

impl AttemptSnapshot {
    pub(crate) fn at(attempt: &Attempt, now: OffsetDateTime) -> Self {
        let remaining_seconds = if attempt.status == AttemptStatus::InProgress {
            attempt.remaining_seconds(now)
        } else {
            0
        };

        Self {
            id: attempt.id.clone(),
            test_id: attempt.test_id.clone(),
            student_email: attempt.student_email.clone(),
            status: attempt.status,
            started_at: format_offset(attempt.started_at),
            submitted_at: attempt.submitted_at.map(format_offset),
            duration_minutes: attempt.duration_minutes,
            deadline: format_offset(attempt.deadline()),
            remaining_seconds,
            total_marks: attempt.total_marks,
            exit_count: attempt.exit_count,
            blocked: attempt.blocked,
            score: attempt.score,
            answers: attempt.answers.iter().map(AnswerSlotResponse::from).collect(),
        }
    }
}
