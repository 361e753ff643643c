//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (TEACHQL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [optimizer]
//! enable_index_pushdown = true
//! enable_predicate_pushdown = true
//!
//! [execution]
//! chunk_capacity = 1024
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TEACHQL_OPTIMIZER__ENABLE_INDEX_PUSHDOWN=false
//! TEACHQL_EXECUTION__CHUNK_CAPACITY=4096
//! ```
//!
//! None of these settings are consulted by the storage/transaction
//! collaborator (out of this crate's scope per the buffer pool, WAL and
//! session front-end being external); they only steer choices the
//! planner and operator runtime make themselves.

use crate::tuple::chunk::DEFAULT_CHUNK_CAPACITY;
use figment::{Figment, providers::{Env, Format, Toml}};
use serde::{Deserialize, Serialize};

/// Top-level configuration for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Toggles for the logical/physical planners. Every one of these
/// defaults to the behavior the planner already implements; turning a
/// flag off degrades to the more conservative plan shape rather than
/// failing, so a config file from an older version of this crate still
/// loads cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Rewrite `TableGet` + equality predicate on an indexed field into
    /// a point `IndexScan`. Disabling this forces every scan through
    /// `TableScan`, predicates re-applied residually.
    #[serde(default = "default_true")]
    pub enable_index_pushdown: bool,

    /// Attach `ON`/`WHERE` predicates to the innermost `TableGet` they
    /// can run against instead of evaluating them only after the join.
    #[serde(default = "default_true")]
    pub enable_predicate_pushdown: bool,

    /// Prefer the vectorized (chunk-at-a-time) physical plan for the
    /// node kinds that support it (`TableGet`, `Projection`, `GroupBy`,
    /// `Explain`) instead of the row-at-a-time Volcano pipeline.
    #[serde(default)]
    pub prefer_vectorized: bool,
}

/// Tuning knobs for the operator runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Row count per batch for the vectorized pipeline's `Chunk`s.
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,

    /// Initial capacity reserved when an operator materializes rows
    /// up front (`OrderBy`'s `values[][]`, `GroupBy`'s group buffer).
    #[serde(default = "default_materialize_capacity")]
    pub materialize_capacity: usize,
}

fn default_chunk_capacity() -> usize {
    DEFAULT_CHUNK_CAPACITY
}
fn default_materialize_capacity() -> usize {
    256
}
fn default_true() -> bool {
    true
}

/// Logging configuration, consumed by the binary/session front-end to
/// set up a `tracing_subscriber` once at startup; the core itself only
/// emits `tracing` events and has no opinion on the subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (`TEACHQL_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("TEACHQL_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TEACHQL_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            optimizer: OptimizerConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig { enable_index_pushdown: true, enable_predicate_pushdown: true, prefer_vectorized: false }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            chunk_capacity: default_chunk_capacity(),
            materialize_capacity: default_materialize_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.optimizer.enable_index_pushdown);
        assert!(!config.optimizer.prefer_vectorized);
        assert_eq!(config.execution.chunk_capacity, DEFAULT_CHUNK_CAPACITY);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[optimizer]"));
        assert!(toml_str.contains("[execution]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_from_file_missing_falls_back_to_defaults() {
        let config = Config::from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.execution.chunk_capacity, DEFAULT_CHUNK_CAPACITY);
    }
}
