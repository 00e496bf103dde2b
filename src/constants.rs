//! # System Constants
//!
//! Defaults and fixed values that define the operational boundaries of the
//! reconciliation scheduler.

/// Scheduler defaults applied when configuration leaves a value unset
pub mod defaults {
    /// Name used for logging and for deriving the default finalizer
    pub const CONTROLLER_NAME: &str = "default-controller";

    /// Size of the bounded reconciliation worker pool
    pub const MAX_CONCURRENT_RECONCILIATIONS: usize = 10;

    /// Suffix appended to the controller name to build the managed finalizer
    pub const FINALIZER_SUFFIX: &str = "/finalizer";
}

/// Retry policy defaults
pub mod retry {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_INITIAL_INTERVAL_MS: u64 = 2000;
    pub const DEFAULT_MULTIPLIER: f64 = 1.5;
}

/// Environment variable names recognised by configuration and logging
pub mod env {
    pub const ENVIRONMENT: &str = "RECONCILER_ENV";
    pub const LOG_FORMAT: &str = "RECONCILER_LOG_FORMAT";
    pub const CONTROLLER_NAME: &str = "RECONCILER_CONTROLLER_NAME";
    pub const MAX_CONCURRENT_RECONCILIATIONS: &str = "RECONCILER_MAX_CONCURRENT_RECONCILIATIONS";
    pub const USE_FINALIZER: &str = "RECONCILER_USE_FINALIZER";
    pub const RETRY_MAX_ATTEMPTS: &str = "RECONCILER_RETRY_MAX_ATTEMPTS";

    /// Prefix for nested overrides, e.g. `RECONCILER__RETRY__MAX_ATTEMPTS`
    pub const CONFIG_PREFIX: &str = "RECONCILER";
}
