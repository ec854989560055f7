use anyhow::{Context, Result};
use ingest_config::Config;
use ingest_statsd::MetricsClientConfig;

/// Initializes logging and metrics from the configuration.
///
/// Call this once at startup, before creating an [`Ingest`](crate::Ingest).
pub fn init(config: &Config) -> Result<()> {
    ingest_log::init(config.logging());
    dump_spawn_infos(config);
    init_metrics(config)
}

/// Prints the effective configuration to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        ingest_log::info!("launching without config folder");
    } else {
        ingest_log::info!("launching from config folder {}", config.path().display());
    }

    ingest_log::info!("  max request size: {}", config.max_request_size());
    ingest_log::info!("  pool capacity: {}", config.pool_capacity());
    ingest_log::info!("  sanitize metric names: {}", config.sanitize_metric_names());
    match config.log_message_field() {
        Some(field) => ingest_log::info!("  log message field: {field}"),
        None => ingest_log::info!("  log message field: -"),
    }
}

/// Initializes the statsd client, if a statsd address is configured.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    ingest_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags: config.metrics_default_tags().clone(),
        default_sample_rate: config.metrics_sample_rate().into(),
        buffering: config.metrics_buffering(),
    })
    .with_context(|| format!("failed to initialize statsd client for {host}"))
}
