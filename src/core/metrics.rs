use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

fn describe() {
    describe_counter!("http_requests_total", "HTTP requests served, by status");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request latency, by status"
    );
    describe_counter!("attempts_started_total", "Attempts created");
    describe_counter!("attempt_violations_total", "Proctoring violations recorded");
    describe_counter!("attempts_forfeited_total", "Attempts closed by forfeiture");
    describe_counter!("attempts_submitted_total", "Attempts submitted and graded");
    describe_counter!("test_status_transitions_total", "Sweeper status transitions, by new status");
    describe_counter!("notifications_published_total", "Realtime events accepted, by event");
    describe_counter!("notifications_failed_total", "Realtime events dropped, by event");
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
