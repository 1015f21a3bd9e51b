//! Runner configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `WEFT`, using `__` to separate nested keys:
//!
//! - `WEFT__LOG_FILTER=debug`
//! - `WEFT__DEFAULTS__ERROR_HANDLING=retry`
//! - `WEFT__DEFAULTS__MAX_RETRIES=5`
//! - `WEFT__DEFAULTS__TIMEOUT_MS=10000`

use crate::error::RunnerError;
use serde::Deserialize;
use weft_core::Result;
use weft_workflow::{ErrorHandling, WorkflowSettings};

/// Runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Settings applied to definitions that declare none.
    #[serde(default)]
    pub defaults: SettingsDefaults,
}

/// Overrides for the built-in [`WorkflowSettings`] defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SettingsDefaults {
    /// Failure policy.
    pub error_handling: Option<ErrorHandling>,
    /// Extra attempts under the retry policy.
    pub max_retries: Option<u32>,
    /// Per-node timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            defaults: SettingsDefaults::default(),
        }
    }
}

impl SettingsDefaults {
    /// Returns the workflow settings these defaults describe.
    #[must_use]
    pub fn settings(&self) -> WorkflowSettings {
        let mut settings = WorkflowSettings::default();
        if let Some(error_handling) = self.error_handling {
            settings = settings.with_error_handling(error_handling);
        }
        if let Some(max_retries) = self.max_retries {
            settings = settings.with_max_retries(max_retries);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings = settings.with_timeout_ms(timeout_ms);
        }
        settings
    }
}

impl RunnerConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, RunnerError> {
        Self::from_environment(config::Environment::with_prefix("WEFT"))
    }

    /// Loads configuration from an environment source.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_environment(environment: config::Environment) -> Result<Self, RunnerError> {
        let config: Self = config::Config::builder()
            .add_source(
                environment
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| RunnerError::Config {
                reason: e.to_string(),
            })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        config::Environment::with_prefix("WEFT").source(Some(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ))
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = RunnerConfig::from_environment(environment(&[])).unwrap();
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.defaults.settings(), WorkflowSettings::default());
    }

    #[test]
    fn nested_variables_override_defaults() {
        let config = RunnerConfig::from_environment(environment(&[
            ("WEFT__LOG_FILTER", "weft_workflow=debug"),
            ("WEFT__DEFAULTS__ERROR_HANDLING", "retry"),
            ("WEFT__DEFAULTS__MAX_RETRIES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.log_filter, "weft_workflow=debug");
        let settings = config.defaults.settings();
        assert_eq!(settings.error_handling, ErrorHandling::Retry);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.timeout_ms, 30_000);
    }

    #[test]
    fn invalid_values_are_reported() {
        let report = RunnerConfig::from_environment(environment(&[(
            "WEFT__DEFAULTS__ERROR_HANDLING",
            "explode",
        )]))
        .unwrap_err();
        assert!(report.to_string().contains("invalid configuration"));
    }
}
