use serde::{Deserialize, Serialize};
use time::UtcOffset;
use validator::Validate;

use crate::core::security::Identity;
use crate::core::time::{format_local_date, format_local_time, format_offset, split_local};
use crate::db::models::{Question, Test};
use crate::db::types::TestStatus;
use crate::repositories::{audience_tags, TestFilter};
use crate::services::windows::{NewTest, StartSpec, TestPatch};

/// Either historical shape of a start time. Normalised into [`StartSpec`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StartPayload {
    Instant {
        #[serde(alias = "startAt")]
        start_at: String,
    },
    Local {
        #[serde(alias = "startDate")]
        start_date: String,
        #[serde(alias = "startTime")]
        start_time: String,
        #[serde(default, alias = "utcOffsetMinutes")]
        utc_offset_minutes: i32,
    },
}

impl From<StartPayload> for StartSpec {
    fn from(payload: StartPayload) -> Self {
        match payload {
            StartPayload::Instant { start_at } => StartSpec::Instant(start_at),
            StartPayload::Local { start_date, start_time, utc_offset_minutes } => {
                StartSpec::Local { date: start_date, time: start_time, utc_offset_minutes }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct QuestionPayload {
    #[validate(length(min = 1, message = "question text must not be empty"))]
    pub(crate) text: String,
    #[validate(length(min = 2, max = 4, message = "a question needs 2 to 4 options"))]
    pub(crate) options: Vec<String>,
    #[serde(default, alias = "correctOption")]
    pub(crate) correct_option: Option<u32>,
}

impl From<QuestionPayload> for Question {
    fn from(payload: QuestionPayload) -> Self {
        Question {
            text: payload.text,
            options: payload.options,
            correct_option: payload.correct_option,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TestCreate {
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    #[serde(flatten)]
    pub(crate) start: StartPayload,
    #[serde(alias = "durationMinutes")]
    pub(crate) duration_minutes: serde_json::Value,
    #[serde(default, alias = "endAt")]
    pub(crate) end_at: Option<String>,
    #[serde(default, alias = "passMarks")]
    #[validate(range(min = 0.0, message = "pass_marks must be non-negative"))]
    pub(crate) pass_marks: Option<f64>,
    #[serde(alias = "totalMarks")]
    #[validate(range(exclusive_min = 0.0, message = "total_marks must be positive"))]
    pub(crate) total_marks: f64,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionPayload>,
    #[serde(default)]
    pub(crate) audience: String,
}

impl From<TestCreate> for NewTest {
    fn from(payload: TestCreate) -> Self {
        NewTest {
            title: payload.title,
            start: payload.start.into(),
            duration_minutes: payload.duration_minutes,
            end_at: payload.end_at,
            pass_marks: payload.pass_marks,
            total_marks: payload.total_marks,
            questions: payload.questions.into_iter().map(Question::from).collect(),
            audience: payload.audience,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct TestUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: Option<String>,
    #[serde(flatten)]
    pub(crate) start: Option<StartPayload>,
    #[serde(default, alias = "durationMinutes")]
    pub(crate) duration_minutes: Option<serde_json::Value>,
    #[serde(default, alias = "endAt")]
    pub(crate) end_at: Option<String>,
    #[serde(default, alias = "passMarks")]
    #[validate(range(min = 0.0, message = "pass_marks must be non-negative"))]
    pub(crate) pass_marks: Option<f64>,
    #[serde(default, alias = "totalMarks")]
    #[validate(range(exclusive_min = 0.0, message = "total_marks must be positive"))]
    pub(crate) total_marks: Option<f64>,
    #[serde(default)]
    pub(crate) questions: Option<Vec<QuestionPayload>>,
    #[serde(default)]
    pub(crate) audience: Option<String>,
}

impl From<TestUpdate> for TestPatch {
    fn from(payload: TestUpdate) -> Self {
        TestPatch {
            title: payload.title,
            start: payload.start.map(StartSpec::from),
            // JSON null means "not supplied", same as an absent key.
            duration_minutes: payload.duration_minutes.filter(|value| !value.is_null()),
            end_at: payload.end_at,
            pass_marks: payload.pass_marks,
            total_marks: payload.total_marks,
            questions: payload
                .questions
                .map(|questions| questions.into_iter().map(Question::from).collect()),
            audience: payload.audience,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TestListQuery {
    /// Comma-delimited audience tags.
    #[serde(default)]
    pub(crate) audience: Option<String>,
    #[serde(default)]
    pub(crate) faculty: Option<String>,
}

impl From<TestListQuery> for TestFilter {
    fn from(query: TestListQuery) -> Self {
        TestFilter {
            audience: query
                .audience
                .as_deref()
                .map(|raw| audience_tags(raw).map(str::to_string).collect())
                .unwrap_or_default(),
            faculty_id: query
                .faculty
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusPreviewQuery {
    #[serde(default, alias = "startAt")]
    pub(crate) start_at: String,
    #[serde(default, alias = "endAt")]
    pub(crate) end_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusPreview {
    pub(crate) status: TestStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) index: usize,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) correct_option: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TestResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) start_at: String,
    /// UTC calendar date of the start, for clients still on the date/time pair.
    pub(crate) start_date: String,
    pub(crate) start_time: String,
    pub(crate) end_at: String,
    pub(crate) end_overridden: bool,
    pub(crate) duration_minutes: f64,
    pub(crate) pass_marks: Option<f64>,
    pub(crate) total_marks: f64,
    pub(crate) audience: Vec<String>,
    pub(crate) faculty_id: String,
    pub(crate) status: TestStatus,
    pub(crate) questions: Vec<QuestionResponse>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl TestResponse {
    /// The answer key is only shown to the faculty who owns the test.
    pub(crate) fn for_viewer(test: Test, viewer: &Identity) -> Self {
        let reveal_key = viewer.is_faculty() && viewer.user_id == test.faculty_id;
        let (date, time) = split_local(test.start_at, UtcOffset::UTC);

        Self {
            start_at: format_offset(test.start_at),
            start_date: format_local_date(date),
            start_time: format_local_time(time),
            end_at: format_offset(test.end_at),
            end_overridden: test.end_overridden,
            duration_minutes: test.duration_minutes,
            pass_marks: test.pass_marks,
            total_marks: test.total_marks,
            audience: audience_tags(&test.audience).map(str::to_string).collect(),
            status: test.status,
            questions: test
                .questions
                .0
                .into_iter()
                .enumerate()
                .map(|(index, question)| QuestionResponse {
                    index,
                    text: question.text,
                    options: question.options,
                    correct_option: if reveal_key { question.correct_option } else { None },
                })
                .collect(),
            created_at: format_offset(test.created_at),
            updated_at: format_offset(test.updated_at),
            id: test.id,
            title: test.title,
            faculty_id: test.faculty_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_accepts_instant_start() {
        let payload: TestCreate = serde_json::from_value(json!({
            "title": "Quiz",
            "start_at": "2025-03-01T10:00:00Z",
            "duration_minutes": 30,
            "total_marks": 10
        }))
        .expect("payload");

        let input = NewTest::from(payload);
        assert_eq!(input.start, StartSpec::Instant("2025-03-01T10:00:00Z".to_string()));
        assert_eq!(input.duration_minutes, json!(30));
    }

    #[test]
    fn create_accepts_local_start_in_camel_case() {
        let payload: TestCreate = serde_json::from_value(json!({
            "title": "Quiz",
            "startDate": "2025-03-01",
            "startTime": "09:30",
            "utcOffsetMinutes": 330,
            "durationMinutes": "45",
            "totalMarks": 20
        }))
        .expect("payload");

        assert_eq!(
            StartSpec::from(payload.start),
            StartSpec::Local {
                date: "2025-03-01".to_string(),
                time: "09:30".to_string(),
                utc_offset_minutes: 330,
            }
        );
    }

    #[test]
    fn create_without_start_is_rejected() {
        let result = serde_json::from_value::<TestCreate>(json!({
            "title": "Quiz",
            "duration_minutes": 30,
            "total_marks": 10
        }));

        assert!(result.is_err());
    }

    #[test]
    fn update_without_window_fields_keeps_window() {
        let payload: TestUpdate =
            serde_json::from_value(json!({ "title": "Renamed", "duration_minutes": null }))
                .expect("payload");

        let patch = TestPatch::from(payload);
        assert!(patch.start.is_none());
        assert!(patch.duration_minutes.is_none());
        assert_eq!(patch.title.as_deref(), Some("Renamed"));
    }

    #[test]
    fn list_query_splits_audience() {
        let filter = TestFilter::from(TestListQuery {
            audience: Some("cs-a, cs-b ,".to_string()),
            faculty: Some("  ".to_string()),
        });

        assert_eq!(filter.audience, vec!["cs-a", "cs-b"]);
        assert_eq!(filter.faculty_id, None);
    }

    #[test]
    fn question_validation_rejects_single_option() {
        let payload = QuestionPayload {
            text: "Pick".to_string(),
            options: vec!["only".to_string()],
            correct_option: None,
        };

        assert!(payload.validate().is_err());
    }
}
