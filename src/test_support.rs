use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use serde_json::Value;
use sqlx::types::Json;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{
    config::Settings,
    security::{self, Identity},
    state::AppState,
    time as clock,
};
use crate::db::models::{Question, Test};
use crate::db::types::{TestStatus, UserRole};
use crate::repositories::memory::MemoryStore;
use crate::services::notifier::{Notifier, NotifyError};

const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) recorder: Arc<RecordingNotifier>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("PROCTOR_ENV", "test");
    std::env::set_var("PROCTOR_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("ALGORITHM", "HS256");
    std::env::remove_var("DATABASE_URL");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("PROJECT_NAME");
    std::env::set_var("REDIS_HOST", "127.0.0.1");
    std::env::set_var("REDIS_PORT", "6379");
    std::env::set_var("REDIS_DB", "1");
    std::env::remove_var("REDIS_PASSWORD");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

/// Application wired to an in-memory store and a recording notifier.
pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let store = Arc::new(MemoryStore::new());
    let recorder = Arc::new(RecordingNotifier::default());

    let state = AppState::new(settings, store.clone(), recorder.clone(), None);
    let app = api::router::router(state.clone());

    TestContext { state, app, store, recorder, _guard: guard }
}

#[derive(Debug, Clone)]
pub(crate) struct Published {
    pub(crate) channel: String,
    pub(crate) event: String,
    pub(crate) payload: Value,
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    published: StdMutex<Vec<Published>>,
}

impl RecordingNotifier {
    pub(crate) fn published(&self) -> Vec<Published> {
        self.published.lock().expect("recorder lock").clone()
    }

    pub(crate) fn published_for_event(&self, event: &str) -> Vec<Published> {
        self.published().into_iter().filter(|p| p.event == event).collect()
    }

    pub(crate) fn channels_for_event(&self, event: &str) -> Vec<String> {
        self.published_for_event(event).into_iter().map(|p| p.channel).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        self.published.lock().expect("recorder lock").push(Published {
            channel: channel.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

pub(crate) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn publish(&self, _: &str, _: &str, _: &Value) -> Result<(), NotifyError> {
        Err(NotifyError::Disconnected)
    }
}

/// `count` four-option questions; question `i` expects option `i % 4`.
pub(crate) fn sample_questions(count: usize) -> Vec<Question> {
    (0..count)
        .map(|index| Question {
            text: format!("Question {}", index + 1),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_option: Some((index % 4) as u32),
        })
        .collect()
}

/// Stored test row with audience `cs-a`, owned by `faculty-1`, status `upcoming`.
pub(crate) fn sample_test(
    id: &str,
    start_at: OffsetDateTime,
    duration_minutes: f64,
    questions: usize,
    total_marks: f64,
) -> Test {
    let end_at = clock::window_end(start_at, duration_minutes).expect("window end");
    Test {
        id: id.to_string(),
        title: format!("Test {id}"),
        start_at,
        duration_minutes,
        end_at,
        end_overridden: false,
        pass_marks: None,
        total_marks,
        questions: Json(sample_questions(questions)),
        audience: "cs-a".to_string(),
        faculty_id: "faculty-1".to_string(),
        status: TestStatus::Upcoming,
        status_changed_at: None,
        status_notified_at: None,
        created_at: start_at - Duration::days(1),
        updated_at: start_at - Duration::days(1),
    }
}

pub(crate) fn student_token(email: &str, settings: &Settings) -> String {
    let identity = Identity {
        user_id: format!("student:{email}"),
        email: email.to_string(),
        role: UserRole::Student,
    };
    security::create_access_token(&identity, settings, None).expect("token")
}

pub(crate) fn faculty_token(user_id: &str, settings: &Settings) -> String {
    let identity = Identity {
        user_id: user_id.to_string(),
        email: format!("{user_id}@faculty.test"),
        role: UserRole::Faculty,
    };
    security::create_access_token(&identity, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
