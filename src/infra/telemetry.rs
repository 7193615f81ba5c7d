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

pub const METRIC_DOCUMENTS_RECEIVED: &str = "zplcast_documents_received_total";
pub const METRIC_RENDER_TOTAL: &str = "zplcast_render_total";
pub const METRIC_RENDER_MS: &str = "zplcast_render_ms";
pub const METRIC_VIEWERS_CONNECTED: &str = "zplcast_viewers_connected";
pub const METRIC_BROADCAST_DELIVERIES: &str = "zplcast_broadcast_deliveries_total";
pub const METRIC_STREAM_CONNECTIONS: &str = "zplcast_stream_connections_total";

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

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_DOCUMENTS_RECEIVED,
            Unit::Count,
            "Total number of non-blank documents received, labelled by ingestion channel."
        );
        describe_counter!(
            METRIC_RENDER_TOTAL,
            Unit::Count,
            "Total number of render attempts, labelled by outcome."
        );
        describe_histogram!(
            METRIC_RENDER_MS,
            Unit::Milliseconds,
            "Render gateway latency in milliseconds."
        );
        describe_gauge!(
            METRIC_VIEWERS_CONNECTED,
            Unit::Count,
            "Current number of connected broadcast viewers."
        );
        describe_counter!(
            METRIC_BROADCAST_DELIVERIES,
            Unit::Count,
            "Total number of events handed to individual viewers."
        );
        describe_counter!(
            METRIC_STREAM_CONNECTIONS,
            Unit::Count,
            "Total number of closed stream connections, labelled by frame result."
        );
    });
}
