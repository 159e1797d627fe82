// crates/serialite-config/src/config.rs
// ============================================================================
// Module: Serialite Configuration
// Description: Configuration loading and validation for the bridge.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file (or [`BridgeConfig::default`])
//! yields a working bridge. Values are validated after parsing; invalid
//! configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "serialite.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SERIALITE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default number of prepare retries under engine contention.
pub const DEFAULT_PREPARE_MAX_RETRIES: u32 = 100;
/// Default linear backoff step between prepare retries (microseconds).
pub const DEFAULT_PREPARE_BACKOFF_STEP_US: u64 = 100;
/// Upper bound accepted for `prepare.max_retries`.
const MAX_PREPARE_RETRIES: u32 = 10_000;
/// Upper bound accepted for `prepare.backoff_step_us`.
const MAX_PREPARE_BACKOFF_STEP_US: u64 = 1_000_000;
/// Default maximum engine filename length in bytes.
pub const DEFAULT_MAX_PATH_BYTES: usize = 512;
/// Minimum worker stack size accepted when one is configured.
const MIN_WORKER_STACK_BYTES: usize = 64 * 1024;
/// Default worker thread name prefix.
const DEFAULT_THREAD_NAME_PREFIX: &str = "serialite-conn";
/// Default log filter directive.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level bridge configuration.
///
/// # Invariants
/// - Sections are validated independently by [`BridgeConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Connection worker thread settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Statement compile retry policy.
    #[serde(default)]
    pub prepare: PrepareRetryConfig,
    /// Engine open options.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then [`CONFIG_ENV_VAR`], then
    /// `serialite.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.worker.validate()?;
        self.prepare.validate()?;
        self.engine.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Connection worker thread settings.
///
/// # Invariants
/// - `thread_name_prefix` is non-empty and contains no NUL bytes.
/// - `stack_size_bytes`, when set, is at least 64 KiB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Prefix for worker thread names; the connection id is appended.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Optional worker thread stack size in bytes.
    #[serde(default)]
    pub stack_size_bytes: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: default_thread_name_prefix(),
            stack_size_bytes: None,
        }
    }
}

impl WorkerConfig {
    /// Validates worker settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "worker.thread_name_prefix must be non-empty".to_string(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(ConfigError::Invalid(
                "worker.thread_name_prefix must not contain NUL".to_string(),
            ));
        }
        if let Some(stack) = self.stack_size_bytes
            && stack < MIN_WORKER_STACK_BYTES
        {
            return Err(ConfigError::Invalid(format!(
                "worker.stack_size_bytes must be at least {MIN_WORKER_STACK_BYTES}"
            )));
        }
        Ok(())
    }
}

/// Bounded retry policy for compiling statements while the engine is busy.
///
/// # Invariants
/// - Total attempts are `max_retries + 1`.
/// - The delay before retry `n` (1-based) is `n * backoff_step_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareRetryConfig {
    /// Maximum number of retries after the first busy attempt.
    #[serde(default = "default_prepare_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step in microseconds.
    #[serde(default = "default_prepare_backoff_step_us")]
    pub backoff_step_us: u64,
}

impl Default for PrepareRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_PREPARE_MAX_RETRIES,
            backoff_step_us: DEFAULT_PREPARE_BACKOFF_STEP_US,
        }
    }
}

impl PrepareRetryConfig {
    /// Returns the delay applied before the given 1-based retry.
    #[must_use]
    pub fn delay_before(&self, retry: u32) -> Duration {
        Duration::from_micros(self.backoff_step_us.saturating_mul(u64::from(retry)))
    }

    /// Validates retry bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries > MAX_PREPARE_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "prepare.max_retries out of range: {} (max {MAX_PREPARE_RETRIES})",
                self.max_retries
            )));
        }
        if self.backoff_step_us > MAX_PREPARE_BACKOFF_STEP_US {
            return Err(ConfigError::Invalid(format!(
                "prepare.backoff_step_us out of range: {} (max {MAX_PREPARE_BACKOFF_STEP_US})",
                self.backoff_step_us
            )));
        }
        Ok(())
    }
}

/// Engine open mode.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` open flag combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Read-write, creating the database file when missing.
    #[default]
    ReadWriteCreate,
    /// Read-write; the database file must exist.
    ReadWrite,
    /// Read-only; the database file must exist.
    ReadOnly,
}

/// Engine open options.
///
/// # Invariants
/// - `max_path_bytes` is within `1..=4096`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine busy timeout in milliseconds; zero reports busy immediately.
    #[serde(default)]
    pub busy_timeout_ms: u64,
    /// Engine open mode.
    #[serde(default)]
    pub open_mode: OpenMode,
    /// Maximum accepted filename length in bytes.
    #[serde(default = "default_max_path_bytes")]
    pub max_path_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 0,
            open_mode: OpenMode::default(),
            max_path_bytes: DEFAULT_MAX_PATH_BYTES,
        }
    }
}

impl EngineConfig {
    /// Validates engine options.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_path_bytes == 0 || self.max_path_bytes > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "engine.max_path_bytes out of range: {} (max {MAX_TOTAL_PATH_LENGTH})",
                self.max_path_bytes
            )));
        }
        Ok(())
    }
}

/// Logging settings.
///
/// # Invariants
/// - `filter` is a non-empty `tracing` filter directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit ANSI colors.
    #[serde(default)]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Validates logging settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O error while reading config.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default worker thread name prefix.
fn default_thread_name_prefix() -> String {
    DEFAULT_THREAD_NAME_PREFIX.to_string()
}

/// Returns the default prepare retry count.
const fn default_prepare_max_retries() -> u32 {
    DEFAULT_PREPARE_MAX_RETRIES
}

/// Returns the default prepare backoff step.
const fn default_prepare_backoff_step_us() -> u64 {
    DEFAULT_PREPARE_BACKOFF_STEP_US
}

/// Returns the default maximum filename length.
const fn default_max_path_bytes() -> usize {
    DEFAULT_MAX_PATH_BYTES
}

/// Returns the default log filter.
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::PrepareRetryConfig;

    #[test]
    fn prepare_delay_grows_linearly_with_retry_index() {
        let policy = PrepareRetryConfig {
            max_retries: 3,
            backoff_step_us: 100,
        };
        assert_eq!(policy.delay_before(1), Duration::from_micros(100));
        assert_eq!(policy.delay_before(3), Duration::from_micros(300));
    }

    #[test]
    fn prepare_delay_saturates_instead_of_overflowing() {
        let policy = PrepareRetryConfig {
            max_retries: u32::MAX,
            backoff_step_us: u64::MAX,
        };
        assert_eq!(policy.delay_before(2), Duration::from_micros(u64::MAX));
    }
}
