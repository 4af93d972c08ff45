//! Runtime configuration.
//!
//! A [`RuntimeConfig`] is handed to [`Runtime::new`](crate::Runtime::new).
//! Values can be set in code or read from the environment:
//!
//! | Variable                 | Field             |
//! |--------------------------|-------------------|
//! | `STRATA_SWEEP_THRESHOLD` | `sweep_threshold` |
//! | `STRATA_MAX_BUFFER`      | `max_buffer_len`  |
//! | `STRATA_LOG`             | `log_level`       |

use crate::error::{Error, Result};
use strata_log::Level;

/// Default number of allocations between automatic cycle sweeps.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 700;

/// Default upper bound on a single native buffer, in elements.
pub const DEFAULT_MAX_BUFFER_LEN: usize = 1 << 24;

/// Tunables for one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Allocations between automatic cycle sweeps; `0` disables them.
    pub sweep_threshold: usize,
    /// Largest buffer a phase-1 initializer may allocate, in elements.
    pub max_buffer_len: usize,
    /// Log level applied when the runtime is created; `None` keeps the
    /// current global level.
    pub log_level: Option<Level>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            max_buffer_len: DEFAULT_MAX_BUFFER_LEN,
            log_level: None,
        }
    }
}

impl RuntimeConfig {
    /// Returns the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the automatic sweep threshold.
    #[must_use]
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Sets the native buffer limit.
    #[must_use]
    pub fn with_max_buffer_len(mut self, len: usize) -> Self {
        self.max_buffer_len = len;
        self
    }

    /// Sets the log level applied at runtime creation.
    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Builds a configuration from `STRATA_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a variable is set but cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("STRATA_SWEEP_THRESHOLD") {
            config.sweep_threshold = parse_usize("STRATA_SWEEP_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("STRATA_MAX_BUFFER") {
            config.max_buffer_len = parse_usize("STRATA_MAX_BUFFER", &raw)?;
        }
        if let Some(raw) = lookup(strata_log::DEFAULT_ENV_VAR) {
            let level = raw.parse::<Level>().map_err(|_| Error::InvalidConfig {
                key: strata_log::DEFAULT_ENV_VAR.to_string(),
                value: raw.clone(),
            })?;
            config.log_level = Some(level);
        }

        Ok(config)
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|_| Error::InvalidConfig {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::new();
        assert_eq!(config.sweep_threshold, DEFAULT_SWEEP_THRESHOLD);
        assert_eq!(config.max_buffer_len, DEFAULT_MAX_BUFFER_LEN);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn test_builder_methods() {
        let config = RuntimeConfig::new()
            .with_sweep_threshold(0)
            .with_max_buffer_len(16)
            .with_log_level(Level::Trace);
        assert_eq!(config.sweep_threshold, 0);
        assert_eq!(config.max_buffer_len, 16);
        assert_eq!(config.log_level, Some(Level::Trace));
    }

    #[test]
    fn test_from_lookup() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            ("STRATA_SWEEP_THRESHOLD", " 10 "),
            ("STRATA_MAX_BUFFER", "64"),
            ("STRATA_LOG", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.sweep_threshold, 10);
        assert_eq!(config.max_buffer_len, 64);
        assert_eq!(config.log_level, Some(Level::Debug));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = RuntimeConfig::from_lookup(lookup_from(&[("STRATA_MAX_BUFFER", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidConfig {
                key: "STRATA_MAX_BUFFER".into(),
                value: "lots".into(),
            }
        );

        let err = RuntimeConfig::from_lookup(lookup_from(&[("STRATA_LOG", "loud")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
