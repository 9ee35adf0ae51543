//! Dispatch API configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Serve the API when the engine starts
    pub enabled: bool,

    /// Listen address, e.g. "0.0.0.0:8080"
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Validatable for ApiConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.enabled {
            self.ensure_not_blank("bind_address", &self.bind_address)?;
            if !self.bind_address.contains(':') {
                return Err(self.invalid(format!(
                    "bind_address must be host:port, got '{}'",
                    self.bind_address
                )));
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "api"
    }
}
