use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_RESPONSE_CLEAR, METRIC_RESPONSE_EVICT, METRIC_RESPONSE_EXPIRED, METRIC_RESPONSE_HIT,
    METRIC_RESPONSE_MISS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;
use super::http::METRIC_HTTP_REQUEST_MS;

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
            METRIC_RESPONSE_HIT,
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            METRIC_RESPONSE_MISS,
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            METRIC_RESPONSE_EXPIRED,
            Unit::Count,
            "Total number of response-cache entries dropped after their TTL."
        );
        describe_counter!(
            METRIC_RESPONSE_EVICT,
            Unit::Count,
            "Total number of response-cache evictions due to capacity."
        );
        describe_counter!(
            METRIC_RESPONSE_CLEAR,
            Unit::Count,
            "Total number of manual response-cache clears."
        );
        describe_histogram!(
            METRIC_HTTP_REQUEST_MS,
            Unit::Milliseconds,
            "Public request latency in milliseconds."
        );
    });
}
