// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for WorkRail.
//!
//! This crate provides [`WorkrailConfig`] — the runtime settings of the
//! durable core — together with helpers for loading from TOML files,
//! merging overlays, resolving the data directory, and producing
//! advisory [`ConfigWarning`]s.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "WORKRAIL_DATA_DIR";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The lock retry band is unusually wide.
    WideRetryBand {
        /// Configured floor in milliseconds.
        floor_ms: u64,
        /// Configured ceiling in milliseconds.
        ceiling_ms: u64,
    },
    /// The recovery budget is small enough to truncate most prompts.
    SmallRecoveryBudget {
        /// Configured byte budget.
        bytes: usize,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::WideRetryBand {
                floor_ms,
                ceiling_ms,
            } => write!(f, "lock retry band [{floor_ms}, {ceiling_ms}] ms is unusually wide"),
            ConfigWarning::SmallRecoveryBudget { bytes } => {
                write!(f, "recovery budget of {bytes} bytes truncates most prompts")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Runtime settings of the durable core.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct WorkrailConfig {
    /// Data directory; `None` defers to the environment and platform
    /// default.
    pub data_dir: Option<String>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    pub log_level: Option<String>,

    /// Cap on ranked resume candidates.
    pub max_resume_candidates: usize,

    /// UTF-8-safe byte budget for the recovery prompt.
    pub recovery_budget_bytes: usize,

    /// Events per segment before rotation closes it.
    pub segment_rotation_events: usize,

    /// Floor of the lock-busy retry hint, milliseconds.
    pub lock_retry_floor_ms: u64,

    /// Ceiling of the lock-busy retry hint, milliseconds.
    pub lock_retry_ceiling_ms: u64,
}

impl Default for WorkrailConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: Some("info".into()),
            max_resume_candidates: 20,
            recovery_budget_bytes: 24_576,
            segment_rotation_events: 512,
            lock_retry_floor_ms: 250,
            lock_retry_ceiling_ms: 3000,
        }
    }
}

impl WorkrailConfig {
    /// Resolve the data directory: explicit config value, then
    /// `WORKRAIL_DATA_DIR`, then a platform default under the user's home.
    #[must_use]
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".workrail")
    }

    /// Overlay `other` on top of `self`: set fields of `other` win.
    #[must_use]
    pub fn merged_with(&self, other: &PartialConfig) -> Self {
        let mut out = self.clone();
        if let Some(data_dir) = &other.data_dir {
            out.data_dir = Some(data_dir.clone());
        }
        if let Some(log_level) = &other.log_level {
            out.log_level = Some(log_level.clone());
        }
        if let Some(v) = other.max_resume_candidates {
            out.max_resume_candidates = v;
        }
        if let Some(v) = other.recovery_budget_bytes {
            out.recovery_budget_bytes = v;
        }
        if let Some(v) = other.segment_rotation_events {
            out.segment_rotation_events = v;
        }
        if let Some(v) = other.lock_retry_floor_ms {
            out.lock_retry_floor_ms = v;
        }
        if let Some(v) = other.lock_retry_ceiling_ms {
            out.lock_retry_ceiling_ms = v;
        }
        out
    }
}

/// A sparse overlay, every field optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct PartialConfig {
    /// See [`WorkrailConfig::data_dir`].
    pub data_dir: Option<String>,
    /// See [`WorkrailConfig::log_level`].
    pub log_level: Option<String>,
    /// See [`WorkrailConfig::max_resume_candidates`].
    pub max_resume_candidates: Option<usize>,
    /// See [`WorkrailConfig::recovery_budget_bytes`].
    pub recovery_budget_bytes: Option<usize>,
    /// See [`WorkrailConfig::segment_rotation_events`].
    pub segment_rotation_events: Option<usize>,
    /// See [`WorkrailConfig::lock_retry_floor_ms`].
    pub lock_retry_floor_ms: Option<u64>,
    /// See [`WorkrailConfig::lock_retry_ceiling_ms`].
    pub lock_retry_ceiling_ms: Option<u64>,
}

/// Parse a TOML document into a config.
///
/// # Errors
///
/// [`ConfigError::ParseError`] on malformed TOML or unknown keys.
pub fn parse_toml(text: &str) -> Result<WorkrailConfig, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Load a config file from disk.
///
/// # Errors
///
/// [`ConfigError::FileNotFound`] or [`ConfigError::ParseError`].
pub fn load_file(path: &Path) -> Result<WorkrailConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    parse_toml(&text)
}

/// Semantic validation; returns advisory warnings on success.
///
/// # Errors
///
/// [`ConfigError::ValidationError`] listing every violated constraint.
pub fn validate_config(config: &WorkrailConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut reasons = Vec::new();
    if config.max_resume_candidates == 0 {
        reasons.push("max_resume_candidates must be at least 1".to_string());
    }
    if config.segment_rotation_events == 0 {
        reasons.push("segment_rotation_events must be at least 1".to_string());
    }
    if config.lock_retry_floor_ms < 250 || config.lock_retry_ceiling_ms > 3000 {
        reasons.push("lock retry hints must stay within [250, 3000] ms".to_string());
    }
    if config.lock_retry_floor_ms > config.lock_retry_ceiling_ms {
        reasons.push("lock_retry_floor_ms exceeds lock_retry_ceiling_ms".to_string());
    }
    if config.recovery_budget_bytes < 64 {
        reasons.push("recovery_budget_bytes must be at least 64".to_string());
    }
    if let Some(level) = &config.log_level {
        if !["error", "warn", "info", "debug", "trace"].contains(&level.as_str()) {
            reasons.push(format!("unknown log level '{level}'"));
        }
    }
    if !reasons.is_empty() {
        return Err(ConfigError::ValidationError { reasons });
    }

    let mut warnings = Vec::new();
    if config.lock_retry_ceiling_ms - config.lock_retry_floor_ms > 2500 {
        warnings.push(ConfigWarning::WideRetryBand {
            floor_ms: config.lock_retry_floor_ms,
            ceiling_ms: config.lock_retry_ceiling_ms,
        });
    }
    if config.recovery_budget_bytes < 1024 {
        warnings.push(ConfigWarning::SmallRecoveryBudget {
            bytes: config.recovery_budget_bytes,
        });
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let warnings = validate_config(&WorkrailConfig::default()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn toml_round_trip() {
        let cfg = parse_toml("log_level = \"debug\"\nmax_resume_candidates = 5\n").unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.max_resume_candidates, 5);
        assert_eq!(cfg.segment_rotation_events, 512);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(parse_toml("mystery = true\n").is_err());
    }

    #[test]
    fn retry_band_outside_contract_fails() {
        let cfg = WorkrailConfig {
            lock_retry_floor_ms: 100,
            ..WorkrailConfig::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn tiny_budget_warns() {
        let cfg = WorkrailConfig {
            recovery_budget_bytes: 128,
            ..WorkrailConfig::default()
        };
        let warnings = validate_config(&cfg).unwrap();
        assert!(matches!(
            warnings.as_slice(),
            [ConfigWarning::SmallRecoveryBudget { bytes: 128 }]
        ));
    }

    #[test]
    fn overlay_merge_wins_per_field() {
        let base = WorkrailConfig::default();
        let overlay = PartialConfig {
            recovery_budget_bytes: Some(4096),
            ..PartialConfig::default()
        };
        let merged = base.merged_with(&overlay);
        assert_eq!(merged.recovery_budget_bytes, 4096);
        assert_eq!(merged.max_resume_candidates, 20);
    }

    #[test]
    fn explicit_data_dir_wins() {
        let cfg = WorkrailConfig {
            data_dir: Some("/tmp/wr-data".to_string()),
            ..WorkrailConfig::default()
        };
        assert_eq!(cfg.resolve_data_dir(), PathBuf::from("/tmp/wr-data"));
    }
}
