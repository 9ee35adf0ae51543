use crate::storage_layer::StorageLogLayer;
use anyhow::Result;
use spindle_config::{LogFormat, LoggingConfig};
use spindle_interfaces::Storage;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Task log retention used for the `logs` table
const LOG_RETENTION_DAYS: u32 = 7;

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize console logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<()> {
    install(config, None)
}

/// Initialize console logging and persist task-scoped events to `storage`
pub fn init_logging_with_storage(config: &LoggingConfig, storage: Arc<dyn Storage>) -> Result<()> {
    let layer = config
        .persist_task_logs
        .then(|| StorageLogLayer::new(storage, LOG_RETENTION_DAYS));
    install(config, layer)
}

fn install(config: &LoggingConfig, storage_layer: Option<StorageLogLayer>) -> Result<()> {
    let env_filter = EnvFilter::try_new(config.filter_directive())
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer(config.format))
        .with(storage_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    }
}
