//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.modelname.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "model.modelname must not be empty".into(),
            ));
        }
        if self.transform.sizes.is_empty() || self.transform.sizes.contains(&0) {
            return Err(ConfigError::ValidationError(
                "transform.sizes must be a non-empty list of sizes > 0".into(),
            ));
        }
        if self.transform.max_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "transform.max_size must be > 0".into(),
            ));
        }
        if self.transform.std.iter().any(|s| *s <= 0.0) {
            return Err(ConfigError::ValidationError(
                "transform.std values must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.render.alpha) {
            return Err(ConfigError::ValidationError(
                "render.alpha must be between 0.0 and 1.0".into(),
            ));
        }
        if self.render.sigma_divisor == 0 {
            return Err(ConfigError::ValidationError(
                "render.sigma_divisor must be > 0".into(),
            ));
        }
        if !matches!(self.logging.style.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(
                "logging.style must be \"pretty\" or \"json\"".into(),
            ));
        }
        Ok(())
    }
}
