//! Configuration loading and environment variable handling

use crate::domains::utils::parse_duration;
use crate::domains::SpindleConfig;
use crate::error::{ConfigError, ConfigResult};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Loads a [`SpindleConfig`] from YAML and layers `<PREFIX>_*` variables on top
pub struct ConfigLoader {
    prefix: String,
}

impl ConfigLoader {
    /// Loader reading `SPINDLE_*` variables
    pub fn new() -> Self {
        Self::with_prefix("SPINDLE")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load a YAML file, then apply environment overrides and validate.
    /// An empty file yields the defaults.
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<SpindleConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: SpindleConfig = if content.trim().is_empty() {
            SpindleConfig::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env(&self) -> ConfigResult<SpindleConfig> {
        let mut config = SpindleConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// [`from_file`](Self::from_file) when a path is given, else [`from_env`](Self::from_env)
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<SpindleConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut SpindleConfig) -> ConfigResult<()> {
        self.override_parsed("STORAGE_BACKEND", &mut config.storage.backend)?;
        self.override_parsed("STORAGE_URL", &mut config.storage.url)?;
        self.override_parsed("STORAGE_DIALECT", &mut config.storage.dialect)?;
        self.override_parsed("STORAGE_MAX_CONNECTIONS", &mut config.storage.max_connections)?;

        self.override_parsed("BROKER_REQUEUE_ON_ERROR", &mut config.broker.requeue_on_error)?;

        self.override_parsed("API_ENABLED", &mut config.api.enabled)?;
        self.override_parsed("API_BIND_ADDRESS", &mut config.api.bind_address)?;

        self.override_parsed("LOG_LEVEL", &mut config.logging.level)?;
        self.override_parsed("LOG_FORMAT", &mut config.logging.format)?;
        if let Some(filter) = self.var("LOG_FILTER") {
            config.logging.filter = Some(filter);
        }
        self.override_parsed("LOG_PERSIST_TASK_LOGS", &mut config.logging.persist_task_logs)?;

        self.override_parsed("TASK_LOGGER_BATCH_SIZE", &mut config.task_logger.batch_size)?;
        self.override_parsed(
            "TASK_LOGGER_CHANNEL_CAPACITY",
            &mut config.task_logger.channel_capacity,
        )?;
        if let Some(raw) = self.var("TASK_LOGGER_FLUSH_INTERVAL") {
            config.task_logger.flush_interval = parse_duration(&raw)
                .map_err(|message| self.env_error("TASK_LOGGER_FLUSH_INTERVAL", message))?;
        }

        self.override_parsed(
            "SCHEDULER_MAX_CONCURRENT_DISPATCHES",
            &mut config.scheduler.max_concurrent_dispatches,
        )?;
        Ok(())
    }

    /// Replace `target` with the parsed value of `<PREFIX>_<name>` when set
    fn override_parsed<T>(&self, name: &str, target: &mut T) -> ConfigResult<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(raw) = self.var(name) {
            *target = raw
                .trim()
                .parse()
                .map_err(|e: T::Err| self.env_error(name, e.to_string()))?;
        }
        Ok(())
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(self.var_name(name)).ok()
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    fn env_error(&self, name: &str, message: impl Into<String>) -> ConfigError {
        ConfigError::Env {
            var: self.var_name(name),
            message: message.into(),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
