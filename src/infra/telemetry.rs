use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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

/// Register metric descriptions with the installed recorder, once per process.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "blitz_cache_hit_total",
            Unit::Count,
            "Total number of page cache hits."
        );
        describe_counter!(
            "blitz_cache_miss_total",
            Unit::Count,
            "Total number of page cache misses, including expired entries."
        );
        describe_counter!(
            "blitz_cache_store_total",
            Unit::Count,
            "Total number of page store attempts by result."
        );
        describe_histogram!(
            "blitz_cache_store_ms",
            Unit::Milliseconds,
            "Page store latency in milliseconds."
        );
        describe_counter!(
            "blitz_cache_purge_files_total",
            Unit::Count,
            "Total number of files removed or left behind by full purges."
        );
        describe_counter!(
            "blitz_edge_purge_total",
            Unit::Count,
            "Total number of edge purge calls by result."
        );
        describe_counter!(
            "blitz_edge_rate_limited_total",
            Unit::Count,
            "Total number of edge API calls refused by a rate limit or cool-down."
        );
        describe_histogram!(
            "blitz_edge_request_ms",
            Unit::Milliseconds,
            "Edge API request latency in milliseconds."
        );
    });
}
