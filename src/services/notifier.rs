//! Best-effort fan-out of lifecycle events to realtime subscribers.
//!
//! Every event goes to the test channel first and then to one channel per
//! audience tag. Failures are logged and counted; callers never see them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::redis::RedisHandle;
use crate::db::models::{Attempt, Test};
use crate::db::types::{AttemptStatus, TestStatus};
use crate::repositories::audience_tags;

#[derive(Debug, Error)]
pub(crate) enum NotifyError {
    #[error("realtime transport is not connected")]
    Disconnected,
    #[error("realtime publish failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    TestCreated,
    TestUpdated,
    TestDeleted,
    TestStatusChanged,
    ScoreUpdate,
}

impl Event {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::TestCreated => "testCreated",
            Self::TestUpdated => "testUpdated",
            Self::TestDeleted => "testDeleted",
            Self::TestStatusChanged => "testStatusChanged",
            Self::ScoreUpdate => "score:update",
        }
    }
}

#[async_trait]
pub(crate) trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, payload: &Value)
        -> Result<(), NotifyError>;
}

/// Publishes `{"event": …, "payload": …}` documents with Redis `PUBLISH`.
pub(crate) struct RedisNotifier {
    redis: RedisHandle,
}

impl RedisNotifier {
    pub(crate) fn new(redis: RedisHandle) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        let message = serde_json::to_string(&json!({ "event": event, "payload": payload }))?;
        match self.redis.publish(channel, &message).await? {
            Some(_) => Ok(()),
            None => Err(NotifyError::Disconnected),
        }
    }
}

pub(crate) fn test_channel(test_id: &str) -> String {
    format!("test:{test_id}")
}

pub(crate) fn audience_channel(tag: &str) -> String {
    format!("audience:{tag}")
}

/// Channels an event about a test reaches, test channel first.
pub(crate) fn channels_for(test_id: &str, audience: &str) -> Vec<String> {
    std::iter::once(test_channel(test_id))
        .chain(audience_tags(audience).map(audience_channel))
        .collect()
}

#[derive(Clone)]
pub(crate) struct Notifications {
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    pub(crate) fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Publishes `event` once per channel. Returns how many channels accepted it.
    pub(crate) async fn broadcast(
        &self,
        test_id: &str,
        audience: &str,
        event: Event,
        payload: Value,
    ) -> usize {
        let mut delivered = 0;

        for channel in channels_for(test_id, audience) {
            match self.notifier.publish(&channel, event.as_str(), &payload).await {
                Ok(()) => {
                    delivered += 1;
                    metrics::counter!("notifications_published_total", "event" => event.as_str())
                        .increment(1);
                }
                Err(err) => {
                    metrics::counter!("notifications_failed_total", "event" => event.as_str())
                        .increment(1);
                    tracing::warn!(
                        error = %err,
                        channel = %channel,
                        event = event.as_str(),
                        test_id = %test_id,
                        "Failed to publish realtime event"
                    );
                }
            }
        }

        delivered
    }

    pub(crate) async fn test_event(&self, event: Event, test: &Test) -> usize {
        self.broadcast(&test.id, &test.audience, event, test_payload(test)).await
    }

    pub(crate) async fn score_update(&self, attempt: &Attempt, audience: &str) -> usize {
        self.broadcast(&attempt.test_id, audience, Event::ScoreUpdate, score_payload(attempt))
            .await
    }
}

#[derive(Serialize)]
struct TestEventPayload<'a> {
    id: &'a str,
    title: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end_at: OffsetDateTime,
    duration_minutes: f64,
    total_marks: f64,
    pass_marks: Option<f64>,
    audience: &'a str,
    faculty_id: &'a str,
    status: TestStatus,
}

pub(crate) fn test_payload(test: &Test) -> Value {
    serde_json::to_value(TestEventPayload {
        id: &test.id,
        title: &test.title,
        start_at: test.start_at,
        end_at: test.end_at,
        duration_minutes: test.duration_minutes,
        total_marks: test.total_marks,
        pass_marks: test.pass_marks,
        audience: &test.audience,
        faculty_id: &test.faculty_id,
        status: test.status,
    })
    .unwrap_or_else(|_| json!({ "id": test.id }))
}

#[derive(Serialize)]
struct ScoreEventPayload<'a> {
    attempt_id: &'a str,
    test_id: &'a str,
    student_email: &'a str,
    score: Option<f64>,
    total_marks: f64,
    status: AttemptStatus,
    blocked: bool,
    exit_count: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    submitted_at: Option<OffsetDateTime>,
}

pub(crate) fn score_payload(attempt: &Attempt) -> Value {
    serde_json::to_value(ScoreEventPayload {
        attempt_id: &attempt.id,
        test_id: &attempt.test_id,
        student_email: &attempt.student_email,
        score: attempt.score,
        total_marks: attempt.total_marks,
        status: attempt.status,
        blocked: attempt.blocked,
        exit_count: attempt.exit_count,
        submitted_at: attempt.submitted_at,
    })
    .unwrap_or_else(|_| json!({ "attempt_id": attempt.id }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::test_support::{FailingNotifier, RecordingNotifier};

    #[test]
    fn channels_start_with_test_and_skip_blank_tags() {
        assert_eq!(
            channels_for("t1", " cs-a ,cs-b,, cs-a"),
            vec!["test:t1", "audience:cs-a", "audience:cs-b"]
        );
        assert_eq!(channels_for("t1", ""), vec!["test:t1"]);
    }

    #[tokio::test]
    async fn broadcast_publishes_once_per_channel() {
        let recorder = Arc::new(RecordingNotifier::default());
        let notifications = Notifications::new(recorder.clone());

        let delivered =
            notifications.broadcast("t1", "a,b", Event::TestUpdated, json!({ "id": "t1" })).await;

        assert_eq!(delivered, 3);
        let published = recorder.published();
        assert_eq!(
            published.iter().map(|p| p.channel.as_str()).collect::<Vec<_>>(),
            vec!["test:t1", "audience:a", "audience:b"]
        );
        assert!(published.iter().all(|p| p.event == "testUpdated"));
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let notifications = Notifications::new(Arc::new(FailingNotifier));

        let delivered =
            notifications.broadcast("t1", "a", Event::TestDeleted, json!({ "id": "t1" })).await;

        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn disconnected_redis_is_a_failure() {
        let notifier = RedisNotifier::new(RedisHandle::new("redis://127.0.0.1:6379/1".into()));

        let result = notifier.publish("test:t1", "testCreated", &json!({})).await;

        assert!(matches!(result, Err(NotifyError::Disconnected)));
    }
}
