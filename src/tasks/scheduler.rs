use anyhow::Result;
use tokio::time::{interval, MissedTickBehavior};

use crate::core::shutdown::Shutdown;
use crate::core::state::AppState;
use crate::core::time::now_utc;
use crate::services::sweeper::{self, SweepReport};

/// Sweeps test statuses on the configured interval until `shutdown` fires.
pub(crate) async fn run(state: AppState, shutdown: Shutdown) {
    let mut tick = interval(state.settings().sweeper().interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let stopped = shutdown.triggered();
    tokio::pin!(stopped);

    tracing::info!(
        interval_seconds = state.settings().sweeper().interval_seconds,
        "Status sweeper started"
    );

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = tick.tick() => {
                if let Err(err) = sweep_once(&state).await {
                    tracing::error!(error = %err, "Status sweep failed");
                }
            }
        }
    }

    tracing::info!("Status sweeper stopped");
}

pub(crate) async fn sweep_once(state: &AppState) -> Result<SweepReport> {
    let report = sweeper::sweep(
        state.tests().as_ref(),
        state.notifications(),
        now_utc(),
        state.settings().sweeper().recent_window(),
    )
    .await?;

    if report != SweepReport::default() {
        tracing::info!(
            transitioned = report.transitioned,
            announced = report.announced,
            "Status sweep finished"
        );
    }
    Ok(report)
}
