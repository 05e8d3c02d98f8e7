use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "stampa_render_total",
            Unit::Count,
            "Render requests by outcome and, for failures, the failing stage."
        );
        describe_histogram!(
            "stampa_render_ms",
            Unit::Milliseconds,
            "End-to-end render latency in milliseconds."
        );
        describe_histogram!(
            "stampa_injector_ms",
            Unit::Milliseconds,
            "Single injector invocation latency in milliseconds."
        );
        describe_gauge!(
            "stampa_catalog_templates",
            Unit::Count,
            "Active templates held by the in-memory catalog."
        );
        describe_counter!(
            "stampa_rate_limited_total",
            Unit::Count,
            "Requests rejected by the per-key rate limiter."
        );
    });
}
