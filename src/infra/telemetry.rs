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

/// Install the global tracing subscriber.
///
/// Logs go to stderr so rendered documents written to stdout stay clean.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "trellis_cache_hit_total",
            Unit::Count,
            "Total number of asset cache hits."
        );
        describe_counter!(
            "trellis_cache_miss_total",
            Unit::Count,
            "Total number of asset cache misses, expired entries included."
        );
        describe_counter!(
            "trellis_asset_evicted_total",
            Unit::Count,
            "Total number of assets evicted from the cache."
        );
        describe_counter!(
            "trellis_remote_fetch_total",
            Unit::Count,
            "Total number of remote asset fetches, labelled by result."
        );
        describe_histogram!(
            "trellis_layout_precompile_ms",
            Unit::Milliseconds,
            "Layout precompile latency in milliseconds."
        );
        describe_histogram!(
            "trellis_layout_compile_ms",
            Unit::Milliseconds,
            "Layout compile latency in milliseconds."
        );
    });
}
