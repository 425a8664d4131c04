//! Configuration for benchmark runs and similarity evaluation.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values,
//! and command-line flags take precedence over both.
//!
//! Provider credentials are never stored here: the model registry names
//! the environment variable that holds each key.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// What to do with a row whose LLM call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the row with empty AI fields.
    #[default]
    RecordEmpty,
    /// Leave the row out of the output table.
    Skip,
}

/// Benchmark run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory for benchmark and evaluated tables.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Directory for rendered charts.
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,

    /// Cases table used when `--cases` is not given.
    #[serde(default = "default_cases_path")]
    pub cases_path: PathBuf,

    /// Model registry used when `--models` is not given.
    #[serde(default = "default_models_path")]
    pub models_path: PathBuf,

    /// Number of (model, case) calls in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound on a single LLM call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause before each LLM call, in milliseconds.
    #[serde(default)]
    pub request_delay_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

fn default_cases_path() -> PathBuf {
    PathBuf::from("data/cases.csv")
}

fn default_models_path() -> PathBuf {
    PathBuf::from("models.csv")
}

fn default_concurrency() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            charts_dir: default_charts_dir(),
            cases_path: default_cases_path(),
            models_path: default_models_path(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: 0,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Sentence-embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Hugging Face model id of a BERT-family sentence-transformer.
    #[serde(default = "default_embedding_model")]
    pub model_id: String,

    /// Token window of the model; longer text is split into windows.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Token overlap between consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Windows embedded per forward pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_max_tokens() -> usize {
    256
}

fn default_chunk_overlap() -> usize {
    32
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_embedding_model(),
            max_tokens: default_max_tokens(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Config {
    /// Load configuration from the optional config file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (BENCH_RESULTS_DIR, BENCH_CASES_PATH, BENCH_CONCURRENCY, ...)
    /// 2. Config file (~/.config/case-brief-bench/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;

        serde_yaml::from_str(&content)
            .map_err(|e| BenchError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("BENCH_RESULTS_DIR") {
            self.run.results_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("BENCH_CHARTS_DIR") {
            self.run.charts_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup("BENCH_CASES_PATH") {
            self.run.cases_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("BENCH_MODELS_PATH") {
            self.run.models_path = PathBuf::from(path);
        }

        if let Some(value) = lookup("BENCH_CONCURRENCY") {
            self.run.concurrency = parse_env("BENCH_CONCURRENCY", &value)?;
        }

        if let Some(value) = lookup("BENCH_TIMEOUT_SECS") {
            self.run.timeout_secs = parse_env("BENCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = lookup("BENCH_REQUEST_DELAY_MS") {
            self.run.request_delay_ms = parse_env("BENCH_REQUEST_DELAY_MS", &value)?;
        }

        if let Some(model) = lookup("BENCH_EMBEDDING_MODEL") {
            self.embedding.model_id = model;
        }

        Ok(())
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "case-brief-bench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.run.concurrency == 0 {
            return Err(BenchError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }

        if self.run.timeout_secs == 0 {
            return Err(BenchError::Config(
                "timeout must be greater than zero seconds".to_string(),
            ));
        }

        if self.embedding.max_tokens < 16 {
            return Err(BenchError::Config(format!(
                "embedding max_tokens must be at least 16, got {}",
                self.embedding.max_tokens
            )));
        }

        if self.embedding.batch_size == 0 {
            return Err(BenchError::Config(
                "embedding batch_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BenchError::Config(format!("{} has an invalid value: '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.run.results_dir, PathBuf::from("results"));
        assert_eq!(config.run.concurrency, 1);
        assert_eq!(config.run.timeout(), Duration::from_secs(60));
        assert_eq!(config.run.failure_policy, FailurePolicy::RecordEmpty);
        assert_eq!(
            config.embedding.model_id,
            "sentence-transformers/all-MiniLM-L6-v2"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BENCH_CONCURRENCY", "4"),
            ("BENCH_TIMEOUT_SECS", "15"),
            ("BENCH_RESULTS_DIR", "/tmp/out"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.run.concurrency, 4);
        assert_eq!(config.run.timeout_secs, 15);
        assert_eq!(config.run.results_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_env_overrides_input_paths() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|k| match k {
                "BENCH_CASES_PATH" => Some("/srv/bench/cases.csv".to_string()),
                "BENCH_MODELS_PATH" => Some("/srv/bench/ai_models_20240801_120000.csv".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.run.cases_path, PathBuf::from("/srv/bench/cases.csv"));
        assert_eq!(
            config.run.models_path,
            PathBuf::from("/srv/bench/ai_models_20240801_120000.csv")
        );
    }

    #[test]
    fn test_invalid_env_value_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(|k| (k == "BENCH_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.run.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "run:\n  concurrency: 3\n  failure_policy: skip\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.run.concurrency, 3);
        assert_eq!(config.run.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.run.timeout_secs, 60);
        assert_eq!(config.embedding.max_tokens, 256);
    }
}
