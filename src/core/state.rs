use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::{AttemptStore, TestStore};
use crate::services::attempts::Attempts;
use crate::services::notifier::{Notifications, Notifier};
use crate::services::windows::TestWindows;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    tests: Arc<dyn TestStore>,
    notifications: Notifications,
    windows: TestWindows,
    attempts: Attempts,
    redis: Option<RedisHandle>,
}

impl AppState {
    pub(crate) fn new<S>(
        settings: Settings,
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
        redis: Option<RedisHandle>,
    ) -> Self
    where
        S: TestStore + AttemptStore + 'static,
    {
        let tests: Arc<dyn TestStore> = store.clone();
        let attempt_store: Arc<dyn AttemptStore> = store;
        let notifications = Notifications::new(notifier);

        let windows = TestWindows::new(tests.clone(), notifications.clone());
        let attempts = Attempts::new(tests.clone(), attempt_store, notifications.clone());

        Self {
            inner: Arc::new(InnerState { settings, tests, notifications, windows, attempts, redis }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn tests(&self) -> &Arc<dyn TestStore> {
        &self.inner.tests
    }

    pub(crate) fn notifications(&self) -> &Notifications {
        &self.inner.notifications
    }

    pub(crate) fn windows(&self) -> &TestWindows {
        &self.inner.windows
    }

    pub(crate) fn attempts(&self) -> &Attempts {
        &self.inner.attempts
    }

    pub(crate) fn redis(&self) -> Option<&RedisHandle> {
        self.inner.redis.as_ref()
    }
}
