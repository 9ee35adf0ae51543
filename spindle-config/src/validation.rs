//! Per-domain validation

use crate::error::{ConfigError, ConfigResult};
use std::fmt::Display;

/// Implemented by every configuration domain
pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;

    /// Domain name used in error messages
    fn domain_name(&self) -> &'static str;

    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            domain: self.domain_name(),
            message: message.into(),
        }
    }

    /// Fail unless `value` is above zero
    fn ensure_positive<T>(&self, field: &str, value: T) -> ConfigResult<()>
    where
        T: PartialOrd + Default + Display,
    {
        if value <= T::default() {
            return Err(self.invalid(format!("{} must be greater than 0, got {}", field, value)));
        }
        Ok(())
    }

    /// Fail when `value` is empty or whitespace
    fn ensure_not_blank(&self, field: &str, value: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(self.invalid(format!("{} cannot be empty", field)));
        }
        Ok(())
    }
}
