//! Run configuration: defaults, JSON file loading, fail-fast validation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Upper bound on worker threads. The check endpoint rate-limits
/// aggressively; more parallelism than this only buys 429s.
pub const MAX_THREADS: usize = 32;

/// Immutable run configuration.
///
/// Loaded once at startup from an optional JSON file, then overridden
/// field by field from CLI flags, validated, and shared read-only with
/// every component. Unknown keys in the file are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of concurrent worker threads.
    pub threads: usize,
    /// Per-request deadline in seconds.
    pub timeout: u64,
    /// Maximum retry attempts per candidate after the first try.
    pub retries: u32,
    /// Base backoff delay in seconds (doubled per retry).
    pub retry_delay: f64,
    /// Verbose logging toggle.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 3,
            timeout: 10,
            retries: 5,
            retry_delay: 10.0,
            debug: false,
        }
    }
}

/// A configuration problem that aborts the run before any network activity.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file exists but cannot be read.
    #[error("cannot read config file `{path}`: {source}")]
    Read {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The config file is not valid JSON for this schema.
    #[error("cannot parse config file `{path}`: {source}")]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// `threads` is zero or above [`MAX_THREADS`].
    #[error("`threads` must be between 1 and {MAX_THREADS}, got {value}")]
    Threads {
        /// The rejected value.
        value: usize,
    },
    /// `timeout` is zero.
    #[error("`timeout` must be at least 1 second")]
    Timeout,
    /// `retry_delay` is negative or not a finite number.
    #[error("`retry_delay` must be a non-negative finite number, got {value}")]
    RetryDelay {
        /// The rejected value.
        value: f64,
    },
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the documented defaults. An existing file
    /// that cannot be read or parsed, or one carrying invalid values, is
    /// an error: a run with a broken config must not start.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on read, parse, or validation failure.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(ConfigError::Threads {
                value: self.threads,
            });
        }
        if self.timeout == 0 {
            return Err(ConfigError::Timeout);
        }
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            return Err(ConfigError::RetryDelay {
                value: self.retry_delay,
            });
        }
        Ok(())
    }

    /// Per-request deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Base backoff delay as a [`Duration`]. Call only after
    /// [`validate`](Self::validate); a value that slipped through falls
    /// back to zero rather than panicking.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay).unwrap_or(Duration::ZERO)
    }
}
