use std::sync::Arc;

use serde_json::Value;
use sqlx::types::Json;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::core::errors::ProctorError;
use crate::core::time as clock;
use crate::db::models::{Question, Test};
use crate::repositories::{audience_tags, DeleteOutcome, TestFilter, TestStore};
use crate::services::notifier::{Event, Notifications};

pub(crate) const MIN_OPTIONS: usize = 2;
pub(crate) const MAX_OPTIONS: usize = 4;

/// How a client expressed the start of a window.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StartSpec {
    /// RFC 3339 instant.
    Instant(String),
    /// Naive local date and time as a viewer at `utc_offset_minutes` sees them.
    Local { date: String, time: String, utc_offset_minutes: i32 },
}

impl StartSpec {
    pub(crate) fn resolve(&self) -> Result<OffsetDateTime, ProctorError> {
        match self {
            Self::Instant(raw) => clock::parse_instant(raw)
                .ok_or_else(|| ProctorError::InvalidTimestamp(format!("start_at '{raw}'"))),
            Self::Local { date, time, utc_offset_minutes } => {
                let date = clock::parse_local_date(date)
                    .ok_or_else(|| ProctorError::InvalidTimestamp(format!("start_date '{date}'")))?;
                let time = clock::parse_local_time(time)
                    .ok_or_else(|| ProctorError::InvalidTimestamp(format!("start_time '{time}'")))?;
                let offset = clock::offset_from_minutes(*utc_offset_minutes).ok_or_else(|| {
                    ProctorError::InvalidTimestamp(format!(
                        "utc_offset_minutes {utc_offset_minutes}"
                    ))
                })?;
                Ok(clock::combine_local(date, time, offset))
            }
        }
    }
}

/// Canonical window every stored test carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Window {
    pub(crate) start_at: OffsetDateTime,
    pub(crate) duration_minutes: f64,
    pub(crate) end_at: OffsetDateTime,
    pub(crate) end_overridden: bool,
}

impl Window {
    /// `end_override`, when present, is trusted as-is; otherwise the end is
    /// derived from start and duration. Both instants are stored in UTC.
    pub(crate) fn normalize(
        start_at: OffsetDateTime,
        duration_minutes: f64,
        end_override: Option<&str>,
    ) -> Result<Self, ProctorError> {
        let start_at = start_at.to_offset(UtcOffset::UTC);
        let computed =
            clock::window_end(start_at, duration_minutes).ok_or(ProctorError::InvalidDuration)?;

        let (end_at, end_overridden) = match end_override {
            Some(raw) => (
                clock::parse_instant(raw)
                    .ok_or_else(|| ProctorError::InvalidTimestamp(format!("end_at '{raw}'")))?
                    .to_offset(UtcOffset::UTC),
                true,
            ),
            None => (computed, false),
        };

        Ok(Self { start_at, duration_minutes, end_at, end_overridden })
    }
}

/// Accepts a JSON number or a numeric string. Anything else, and any value
/// that is not a positive finite number, is `InvalidDuration`.
pub(crate) fn parse_duration(value: &Value) -> Result<f64, ProctorError> {
    let minutes = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or(ProctorError::InvalidDuration)?;

    if clock::is_valid_duration(minutes) {
        Ok(minutes)
    } else {
        Err(ProctorError::InvalidDuration)
    }
}

pub(crate) fn validate_marks(pass_marks: Option<f64>, total_marks: f64) -> Result<(), ProctorError> {
    match pass_marks {
        Some(pass) if pass >= total_marks => Err(ProctorError::InvalidPassMarks),
        _ => Ok(()),
    }
}

pub(crate) fn validate_questions(questions: &[Question]) -> Result<(), ProctorError> {
    for (index, question) in questions.iter().enumerate() {
        if question.text.trim().is_empty() {
            return Err(ProctorError::InvalidQuestion { index, reason: "text is empty" });
        }
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&question.options.len()) {
            return Err(ProctorError::InvalidQuestion {
                index,
                reason: "must have between 2 and 4 options",
            });
        }
        if let Some(correct) = question.correct_option {
            if correct as usize >= question.options.len() {
                return Err(ProctorError::InvalidQuestion {
                    index,
                    reason: "correct option is out of range",
                });
            }
        }
    }
    Ok(())
}

/// Distinct trimmed tags joined back with commas.
pub(crate) fn normalize_audience(raw: &str) -> String {
    audience_tags(raw).collect::<Vec<_>>().join(",")
}

#[derive(Debug, Clone)]
pub(crate) struct NewTest {
    pub(crate) title: String,
    pub(crate) start: StartSpec,
    pub(crate) duration_minutes: Value,
    pub(crate) end_at: Option<String>,
    pub(crate) pass_marks: Option<f64>,
    pub(crate) total_marks: f64,
    pub(crate) questions: Vec<Question>,
    pub(crate) audience: String,
}

/// Partial edit. Window fields that are absent keep their stored values, but
/// touching any of them re-derives the end unless `end_at` is supplied.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestPatch {
    pub(crate) title: Option<String>,
    pub(crate) start: Option<StartSpec>,
    pub(crate) duration_minutes: Option<Value>,
    pub(crate) end_at: Option<String>,
    pub(crate) pass_marks: Option<f64>,
    pub(crate) total_marks: Option<f64>,
    pub(crate) questions: Option<Vec<Question>>,
    pub(crate) audience: Option<String>,
}

impl TestPatch {
    fn touches_window(&self) -> bool {
        self.start.is_some() || self.duration_minutes.is_some() || self.end_at.is_some()
    }

    /// Builds the next version of `current`. Pure; the store runs it under the row lock.
    pub(crate) fn apply(
        &self,
        current: &Test,
        faculty_id: &str,
        now: OffsetDateTime,
    ) -> Result<Test, ProctorError> {
        ensure_owner(current, faculty_id)?;

        let mut next = current.clone();

        if self.touches_window() {
            let start_at = match &self.start {
                Some(start) => start.resolve()?,
                None => current.start_at,
            };
            let duration_minutes = match &self.duration_minutes {
                Some(value) => parse_duration(value)?,
                None => current.duration_minutes,
            };
            let window = Window::normalize(start_at, duration_minutes, self.end_at.as_deref())?;

            next.start_at = window.start_at;
            next.duration_minutes = window.duration_minutes;
            next.end_at = window.end_at;
            next.end_overridden = window.end_overridden;
        }

        if let Some(title) = &self.title {
            next.title = title.trim().to_string();
        }
        if let Some(pass_marks) = self.pass_marks {
            next.pass_marks = Some(pass_marks);
        }
        if let Some(total_marks) = self.total_marks {
            next.total_marks = total_marks;
        }
        validate_marks(next.pass_marks, next.total_marks)?;

        if let Some(questions) = &self.questions {
            validate_questions(questions)?;
            next.questions = Json(questions.clone());
        }
        if let Some(audience) = &self.audience {
            next.audience = normalize_audience(audience);
        }

        next.restamp_status(now);
        next.updated_at = now;
        Ok(next)
    }
}

fn ensure_owner(test: &Test, faculty_id: &str) -> Result<(), ProctorError> {
    if test.faculty_id == faculty_id {
        Ok(())
    } else {
        Err(ProctorError::Forbidden("only the faculty who created this test may change it"))
    }
}

/// Scheduling windows of tests, with their derived status kept current on
/// every write.
#[derive(Clone)]
pub(crate) struct TestWindows {
    store: Arc<dyn TestStore>,
    notifications: Notifications,
}

impl TestWindows {
    pub(crate) fn new(store: Arc<dyn TestStore>, notifications: Notifications) -> Self {
        Self { store, notifications }
    }

    pub(crate) async fn create(
        &self,
        faculty_id: &str,
        input: NewTest,
        now: OffsetDateTime,
    ) -> Result<Test, ProctorError> {
        let duration_minutes = parse_duration(&input.duration_minutes)?;
        let start_at = input.start.resolve()?;
        let window = Window::normalize(start_at, duration_minutes, input.end_at.as_deref())?;
        validate_marks(input.pass_marks, input.total_marks)?;
        validate_questions(&input.questions)?;

        let test = Test {
            id: Uuid::new_v4().to_string(),
            title: input.title.trim().to_string(),
            start_at: window.start_at,
            duration_minutes: window.duration_minutes,
            end_at: window.end_at,
            end_overridden: window.end_overridden,
            pass_marks: input.pass_marks,
            total_marks: input.total_marks,
            questions: Json(input.questions),
            audience: normalize_audience(&input.audience),
            faculty_id: faculty_id.to_string(),
            status: clock::live_status(now, window.start_at, Some(window.end_at)),
            status_changed_at: None,
            status_notified_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&test).await?;

        tracing::info!(
            test_id = %test.id,
            faculty_id = %test.faculty_id,
            status = test.status.as_str(),
            "Test created"
        );
        self.notifications.test_event(Event::TestCreated, &test).await;

        Ok(test)
    }

    /// Stored test with its status evaluated against `now`.
    pub(crate) async fn get(&self, id: &str, now: OffsetDateTime) -> Result<Test, ProctorError> {
        let mut test = self.store.find_by_id(id).await?.ok_or(ProctorError::TestNotFound)?;
        test.status = test.live_status(now);
        Ok(test)
    }

    pub(crate) async fn find(
        &self,
        filter: &TestFilter,
        now: OffsetDateTime,
    ) -> Result<Vec<Test>, ProctorError> {
        let mut tests = self.store.list(filter).await?;
        for test in &mut tests {
            test.status = test.live_status(now);
        }
        Ok(tests)
    }

    pub(crate) async fn update(
        &self,
        id: &str,
        faculty_id: &str,
        patch: TestPatch,
        now: OffsetDateTime,
    ) -> Result<Test, ProctorError> {
        let mutation = |current: &Test| patch.apply(current, faculty_id, now);
        let test = self.store.update_with(id, &mutation).await?;

        tracing::info!(
            test_id = %test.id,
            status = test.status.as_str(),
            end_overridden = test.end_overridden,
            "Test updated"
        );
        self.notifications.test_event(Event::TestUpdated, &test).await;

        Ok(test)
    }

    pub(crate) async fn delete(&self, id: &str, faculty_id: &str) -> Result<(), ProctorError> {
        let check = |current: &Test| ensure_owner(current, faculty_id);

        match self.store.delete_checked(id, &check).await? {
            DeleteOutcome::Deleted(test) => {
                tracing::info!(test_id = %test.id, "Test deleted");
                self.notifications.test_event(Event::TestDeleted, &test).await;
                Ok(())
            }
            DeleteOutcome::Missing => Err(ProctorError::TestNotFound),
            DeleteOutcome::Referenced => Err(ProctorError::TestHasAttempts),
        }
    }
}
