use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// `RUST_LOG` wins when set; otherwise the configured level, with query
/// logging from the pool kept at `warn`.
fn env_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&settings.telemetry().log_level)))
}

fn default_directives(level: &str) -> String {
    format!("{level},sqlx=warn")
}

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let builder = fmt().with_env_filter(env_filter(settings)).with_target(false);

    if settings.telemetry().json {
        builder
            .json()
            .with_current_span(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = settings.telemetry().json,
        "Tracing initialised"
    );
    Ok(())
}
