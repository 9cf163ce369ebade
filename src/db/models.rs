use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::core::time as clock;
use crate::db::types::{AttemptStatus, TestStatus};

/// Multiple-choice question embedded in a test. The index inside the test's
/// question list is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    #[serde(default)]
    pub(crate) correct_option: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Test {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) start_at: OffsetDateTime,
    pub(crate) duration_minutes: f64,
    pub(crate) end_at: OffsetDateTime,
    pub(crate) end_overridden: bool,
    pub(crate) pass_marks: Option<f64>,
    pub(crate) total_marks: f64,
    pub(crate) questions: Json<Vec<Question>>,
    pub(crate) audience: String,
    pub(crate) faculty_id: String,
    pub(crate) status: TestStatus,
    pub(crate) status_changed_at: Option<OffsetDateTime>,
    pub(crate) status_notified_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl Test {
    pub(crate) fn live_status(&self, now: OffsetDateTime) -> TestStatus {
        clock::live_status(now, self.start_at, Some(self.end_at))
    }

    /// Brings the cached status in line with the window, stamping the change.
    pub(crate) fn restamp_status(&mut self, now: OffsetDateTime) -> bool {
        let live = self.live_status(now);
        if live == self.status {
            return false;
        }

        self.status = live;
        self.status_changed_at = Some(now);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AnswerSlot {
    pub(crate) question_index: u32,
    #[serde(default)]
    pub(crate) selected_index: Option<u32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_email: String,
    pub(crate) started_at: OffsetDateTime,
    pub(crate) submitted_at: Option<OffsetDateTime>,
    pub(crate) duration_minutes: f64,
    pub(crate) total_marks: f64,
    pub(crate) answers: Json<Vec<AnswerSlot>>,
    pub(crate) exit_count: i32,
    pub(crate) blocked: bool,
    pub(crate) score: Option<f64>,
    pub(crate) status: AttemptStatus,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl Attempt {
    /// Server-side deadline; clients only ever see it as advisory.
    pub(crate) fn deadline(&self) -> OffsetDateTime {
        clock::window_end(self.started_at, self.duration_minutes).unwrap_or(self.started_at)
    }

    pub(crate) fn remaining_seconds(&self, now: OffsetDateTime) -> i64 {
        (self.deadline() - now).whole_seconds().max(0)
    }
}
