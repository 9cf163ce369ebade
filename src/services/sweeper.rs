use time::{Duration, OffsetDateTime};

use crate::repositories::{StoreError, TestStore};
use crate::services::notifier::{Event, Notifications};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepReport {
    pub(crate) transitioned: usize,
    pub(crate) announced: usize,
}

/// One reconciliation pass. Both bulk transitions see the same `now`; then
/// every status change made within `recent_window` that has not been
/// announced yet gets exactly one `testStatusChanged` per channel.
pub(crate) async fn sweep(
    store: &dyn TestStore,
    notifications: &Notifications,
    now: OffsetDateTime,
    recent_window: Duration,
) -> Result<SweepReport, StoreError> {
    let changed = store.sweep_statuses(now).await?;
    for test in &changed {
        metrics::counter!("test_status_transitions_total", "status" => test.status.as_str())
            .increment(1);
        tracing::info!(test_id = %test.id, status = test.status.as_str(), "Test status advanced");
    }

    let claimed = store.claim_status_notifications(now, now - recent_window).await?;
    for test in &claimed {
        notifications.test_event(Event::TestStatusChanged, test).await;
    }

    Ok(SweepReport { transitioned: changed.len(), announced: claimed.len() })
}
