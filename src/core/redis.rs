use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// `PUBLISH channel message`. Returns the receiver count, or `None` when
    /// no connection is open.
    pub(crate) async fn publish(
        &self,
        channel: &str,
        message: &str,
    ) -> Result<Option<i64>, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(None);
        };

        let receivers: i64 =
            cmd("PUBLISH").arg(channel).arg(message).query_async(&mut manager).await?;
        Ok(Some(receivers))
    }
}

#[cfg(test)]
mod tests {
    use super::{RedisHandle, RedisHealth};

    #[tokio::test]
    async fn unconnected_handle_reports_disconnected() {
        let redis = RedisHandle::new("redis://127.0.0.1:6379/1".to_string());

        assert!(matches!(redis.health().await, RedisHealth::Disconnected));
        assert_eq!(redis.publish("test:abc", "{}").await.expect("publish"), None);
    }
}
