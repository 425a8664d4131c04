//! Model registry: which models to benchmark and how to reach them.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Default generation budget when the registry leaves it blank.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// LLM provider family. Selects the client variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
    /// clod.io router (OpenAI-compatible with vendor routing).
    Clod,
    /// Anthropic messages API.
    Anthropic,
}

impl Provider {
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Clod => "https://api.clod.io/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    pub fn default_api_key_env(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Clod => "CLOD_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Clod => "clod",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "clod" => Ok(Provider::Clod),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(BenchError::Config(format!(
                "Unknown provider '{}'. Expected one of: openai, clod, anthropic",
                other
            ))),
        }
    }
}

/// Configuration of one benchmarked model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Identifier written to result tables.
    pub model_id: String,
    pub provider: Provider,
    /// API base URL including the version segment (e.g. "https://api.openai.com/v1").
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Model name as the provider knows it.
    pub provider_model: String,
    /// Upstream vendor, for routers that need one (clod.io).
    pub vendor: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// In-memory key that bypasses the environment (useful for testing).
    pub api_key: Option<String>,
}

impl ModelConfig {
    /// Create a config with provider defaults for everything but the id.
    pub fn new(model_id: impl Into<String>, provider: Provider) -> Self {
        let model_id = model_id.into();
        Self {
            provider_model: model_id.clone(),
            model_id,
            provider,
            endpoint: provider.default_endpoint().to_string(),
            api_key_env: provider.default_api_key_env().to_string(),
            vendor: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            api_key: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = var.into();
        self
    }

    /// Resolve the API key. Missing or blank keys are an auth error.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            if !key.trim().is_empty() {
                return Ok(key.clone());
            }
        }

        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(BenchError::Auth(format!(
                "{} is not set (needed by model '{}')",
                self.api_key_env, self.model_id
            ))),
        }
    }
}

/// One row of the registry file.
#[derive(Debug, Deserialize)]
struct RegistryRow {
    model_id: String,
    provider: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    api_key_env: Option<String>,
    #[serde(default)]
    provider_model: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RegistryRow {
    fn into_config(self) -> Result<ModelConfig> {
        let model_id = self.model_id.trim().to_string();
        if model_id.is_empty() {
            return Err(BenchError::Config("Registry row with empty model_id".to_string()));
        }

        let provider: Provider = self.provider.parse()?;
        let mut config = ModelConfig::new(model_id, provider);

        if let Some(endpoint) = non_blank(self.endpoint) {
            config.endpoint = endpoint;
        }
        if let Some(var) = non_blank(self.api_key_env) {
            config.api_key_env = var;
        }
        if let Some(name) = non_blank(self.provider_model) {
            config.provider_model = name;
        }
        config.vendor = non_blank(self.vendor);
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        config.temperature = self.temperature;

        Ok(config)
    }
}

/// One row of a clod.io catalog export.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(rename = "Provider Name")]
    provider_name: String,
    #[serde(rename = "Model Name")]
    model_name: String,
    #[serde(rename = "Name in Provider", default)]
    name_in_provider: Option<String>,
    #[serde(rename = "Active", default)]
    active: Option<String>,
}

impl CatalogRow {
    fn is_inactive(&self) -> bool {
        self.active
            .as_deref()
            .is_some_and(|a| a.trim().eq_ignore_ascii_case("no"))
    }

    /// Routed through clod.io, identified as `<provider>.<model>`.
    fn into_config(self) -> Result<ModelConfig> {
        let vendor = self.provider_name.trim().to_string();
        let model_name = self.model_name.trim().to_string();
        if vendor.is_empty() || model_name.is_empty() {
            return Err(BenchError::Config(
                "Catalog row without Provider Name or Model Name".to_string(),
            ));
        }

        let mut config = ModelConfig::new(format!("{}.{}", vendor, model_name), Provider::Clod);
        config.provider_model = non_blank(self.name_in_provider).unwrap_or(model_name);
        config.vendor = Some(vendor);
        Ok(config)
    }
}

/// Registry layouts `load_models` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Registry,
    Catalog,
}

impl Layout {
    fn detect(headers: &csv::StringRecord) -> Self {
        let has = |name: &str| headers.iter().any(|h| h == name);
        if !has("model_id") && has("Model Name") && has("Provider Name") {
            Layout::Catalog
        } else {
            Layout::Registry
        }
    }
}

/// Load the model registry from a CSV file.
///
/// Accepts the registry layout (`model_id,provider,...`) or a catalog
/// export written by the `models` command. Inactive catalog models are
/// left out.
pub fn load_models(path: &Path) -> Result<Vec<ModelConfig>> {
    if !path.exists() {
        return Err(BenchError::Config(format!(
            "Model registry not found at '{}'",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut models = Vec::new();
    let mut seen = HashSet::new();

    let layout = Layout::detect(reader.headers()?);
    let malformed = |idx: usize, e: csv::Error| {
        BenchError::Config(format!(
            "Malformed registry row {} in '{}': {}",
            idx + 1,
            path.display(),
            e
        ))
    };

    let configs: Vec<ModelConfig> = match layout {
        Layout::Registry => reader
            .deserialize::<RegistryRow>()
            .enumerate()
            .map(|(idx, row)| row.map_err(|e| malformed(idx, e))?.into_config())
            .collect::<Result<_>>()?,
        Layout::Catalog => {
            let mut configs = Vec::new();
            for (idx, row) in reader.deserialize::<CatalogRow>().enumerate() {
                let row = row.map_err(|e| malformed(idx, e))?;
                if row.is_inactive() {
                    debug!(model = %row.model_name, "skipping inactive catalog model");
                    continue;
                }
                configs.push(row.into_config()?);
            }
            configs
        }
    };

    for config in configs {
        if !seen.insert(config.model_id.clone()) {
            return Err(BenchError::Config(format!(
                "Duplicate model_id '{}' in '{}'",
                config.model_id,
                path.display()
            )));
        }
        models.push(config);
    }

    if models.is_empty() {
        return Err(BenchError::Config(format!(
            "Model registry '{}' has no models",
            path.display()
        )));
    }

    info!(
        path = %path.display(),
        count = models.len(),
        layout = ?layout,
        "loaded model registry"
    );
    Ok(models)
}
