//! # Reconciler Configuration
//!
//! Configuration for a single controller's scheduler and dispatcher.
//!
//! ## Sources
//!
//! - [`ReconcilerConfig::load`] layers an optional file (any format the `config`
//!   crate understands: TOML, YAML, JSON) under `RECONCILER__*` environment
//!   overrides, e.g. `RECONCILER__RETRY__MAX_ATTEMPTS=3`.
//! - [`ReconcilerConfig::from_env`] reads the flat `RECONCILER_*` variables on top
//!   of the defaults.
//!
//! Every field has a default, so an empty file or environment yields a working
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{defaults, env, retry};
use crate::error::{ReconcilerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub controller_name: String,
    /// Size of the bounded worker pool running dispatcher executions
    pub max_concurrent_reconciliations: usize,
    pub use_finalizer: bool,
    /// Managed finalizer; derived from the controller name when unset
    pub finalizer_name: Option<String>,
    pub retry: RetryConfig,
    /// Re-trigger idle resources after this long even without notifications
    pub max_reconciliation_interval_ms: Option<u64>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            controller_name: defaults::CONTROLLER_NAME.to_string(),
            max_concurrent_reconciliations: defaults::MAX_CONCURRENT_RECONCILIATIONS,
            use_finalizer: true,
            finalizer_name: None,
            retry: RetryConfig::default(),
            max_reconciliation_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyKind {
    None,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub policy: RetryPolicyKind,
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicyKind::Exponential,
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            initial_interval_ms: retry::DEFAULT_INITIAL_INTERVAL_MS,
            multiplier: retry::DEFAULT_MULTIPLIER,
            max_interval_ms: None,
        }
    }
}

impl ReconcilerConfig {
    /// Load from an optional file with `RECONCILER__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(env::CONFIG_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let loaded: Self = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ReconcilerError::configuration(format!("Failed to load config: {e}")))?;

        loaded.validate()?;
        tracing::debug!(
            controller = %loaded.controller_name,
            max_concurrent = loaded.max_concurrent_reconciliations,
            "Reconciler configuration loaded"
        );
        Ok(loaded)
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var(env::CONTROLLER_NAME) {
            config.controller_name = name;
        }

        if let Ok(max_concurrent) = std::env::var(env::MAX_CONCURRENT_RECONCILIATIONS) {
            config.max_concurrent_reconciliations = max_concurrent.parse().map_err(|e| {
                ReconcilerError::configuration(format!(
                    "Invalid max_concurrent_reconciliations: {e}"
                ))
            })?;
        }

        if let Ok(use_finalizer) = std::env::var(env::USE_FINALIZER) {
            config.use_finalizer = use_finalizer.parse().map_err(|e| {
                ReconcilerError::configuration(format!("Invalid use_finalizer: {e}"))
            })?;
        }

        if let Ok(max_attempts) = std::env::var(env::RETRY_MAX_ATTEMPTS) {
            config.retry.max_attempts = max_attempts.parse().map_err(|e| {
                ReconcilerError::configuration(format!("Invalid retry max_attempts: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller_name.trim().is_empty() {
            return Err(ReconcilerError::configuration(
                "controller_name must not be empty",
            ));
        }
        if self.max_concurrent_reconciliations == 0 {
            return Err(ReconcilerError::configuration(
                "max_concurrent_reconciliations must be at least 1",
            ));
        }
        if matches!(&self.finalizer_name, Some(name) if name.trim().is_empty()) {
            return Err(ReconcilerError::configuration(
                "finalizer_name must not be empty when set",
            ));
        }
        if self.retry.policy == RetryPolicyKind::Exponential && self.retry.multiplier <= 0.0 {
            return Err(ReconcilerError::configuration(
                "retry multiplier must be positive",
            ));
        }
        Ok(())
    }

    /// Managed finalizer name
    pub fn finalizer(&self) -> String {
        self.finalizer_name.clone().unwrap_or_else(|| {
            format!("{}{}", self.controller_name, defaults::FINALIZER_SUFFIX)
        })
    }

    pub fn max_reconciliation_interval(&self) -> Option<Duration> {
        self.max_reconciliation_interval_ms.map(Duration::from_millis)
    }
}
