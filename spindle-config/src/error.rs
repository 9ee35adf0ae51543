//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a [`crate::SpindleConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A `SPINDLE_*` override could not be parsed
    #[error("Invalid value in {var}: {message}")]
    Env { var: String, message: String },

    /// A domain failed validation
    #[error("Invalid {domain} configuration: {message}")]
    Invalid {
        domain: &'static str,
        message: String,
    },
}
