//! The clod.io model catalog.
//!
//! Lists every model the router can reach and writes it as a CSV that the
//! model registry loader accepts directly.

use super::client::status_error;
use crate::error::{BenchError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// File name prefix of catalog exports.
pub const CATALOG_PREFIX: &str = "ai_models_";

/// Column headers of a catalog export, in order.
pub const CATALOG_COLUMNS: [&str; 13] = [
    "Provider Name",
    "Provider Website",
    "Provider Base URL",
    "Model Name",
    "Name in Provider",
    "Developer",
    "System Complexity",
    "Context Window",
    "Token IN Price ($)",
    "Token OUT Price ($)",
    "Active",
    "Created At",
    "Updated At",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProvider {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// One model as listed by the router.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogModel {
    #[serde(default)]
    pub provider: CatalogProvider,
    #[serde(default)]
    pub system_name: String,
    #[serde(default)]
    pub name_in_provider: Option<String>,
    #[serde(default)]
    pub developer: Option<String>,
    #[serde(default)]
    pub system_complexity: Option<Value>,
    #[serde(default)]
    pub context_window: Option<Value>,
    #[serde(default)]
    pub token_in_price_per_million_tokens: Option<Value>,
    // The router spells this field with one "l".
    #[serde(default, rename = "tokenOutPricePerMilionTokens")]
    pub token_out_price_per_million_tokens: Option<Value>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn value_text(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Prices arrive as numbers or numeric strings. Anything else is zero.
fn price(value: &Option<Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl CatalogModel {
    fn record(&self) -> [String; 13] {
        [
            self.provider.name.clone(),
            self.provider.website_url.clone().unwrap_or_default(),
            self.provider.base_url.clone().unwrap_or_default(),
            self.system_name.clone(),
            self.name_in_provider.clone().unwrap_or_default(),
            self.developer.clone().unwrap_or_default(),
            value_text(&self.system_complexity),
            value_text(&self.context_window),
            price(&self.token_in_price_per_million_tokens).to_string(),
            price(&self.token_out_price_per_million_tokens).to_string(),
            if self.active.unwrap_or(false) { "Yes" } else { "No" }.to_string(),
            self.created_at.clone().unwrap_or_default(),
            self.updated_at.clone().unwrap_or_default(),
        ]
    }
}

/// Client for the router's model listing.
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// `GET {endpoint}/providers/models`.
    pub async fn fetch(&self, endpoint: &str, api_key: &str) -> Result<Vec<CatalogModel>> {
        let url = format!("{}/providers/models", endpoint.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| BenchError::from_request(e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BenchError::from_request(e, self.timeout))?;

        if !status.is_success() {
            return Err(status_error(status, body));
        }

        let models: Vec<CatalogModel> = serde_json::from_str(&body)
            .map_err(|e| BenchError::Provider(format!("Malformed model catalog: {}", e)))?;
        info!(url = %url, count = models.len(), "fetched model catalog");
        Ok(models)
    }
}

/// Path for a new catalog export.
pub fn catalog_output_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}{}.csv", CATALOG_PREFIX, stamp))
}

/// Write the catalog as CSV, one row per model in listing order.
pub fn write_catalog_csv(models: &[CatalogModel], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CATALOG_COLUMNS)?;
    for model in models {
        writer.write_record(model.record())?;
    }
    writer.flush().map_err(|e| BenchError::io(path, e))?;

    info!(path = %path.display(), rows = models.len(), "catalog written");
    Ok(())
}

/// Model counts of a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub total: usize,
    pub by_provider: BTreeMap<String, usize>,
    pub by_developer: BTreeMap<String, usize>,
}

impl CatalogStats {
    pub fn from_models(models: &[CatalogModel]) -> Self {
        let mut stats = Self {
            total: models.len(),
            ..Default::default()
        };
        for model in models {
            *stats
                .by_provider
                .entry(model.provider.name.clone())
                .or_default() += 1;
            let developer = model
                .developer
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string());
            *stats.by_developer.entry(developer).or_default() += 1;
        }
        stats
    }

    pub fn print(&self) {
        println!("Total number of models: {}", self.total);

        println!("\nModels by provider:");
        for (provider, count) in &self.by_provider {
            println!("  {}: {}", provider, count);
        }

        println!("\nModels by developer:");
        for (developer, count) in &self.by_developer {
            println!("  {}: {}", developer, count);
        }
    }
}
