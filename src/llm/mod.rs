//! LLM integration module.
//!
//! Provides the `LlmClient` capability every provider implements, the
//! provider variants themselves, the prompt used to request briefs, and
//! the clod.io model catalog.

mod anthropic;
mod catalog;
mod client;
mod prompts;
mod router;

pub use anthropic::AnthropicClient;
pub use catalog::{
    CATALOG_COLUMNS, CATALOG_PREFIX, CatalogClient, CatalogModel, CatalogProvider, CatalogStats,
    catalog_output_path, write_catalog_csv,
};
pub use client::{LlmClient, Message, OpenAiCompatibleClient, Role, ping};
pub use prompts::Prompts;
pub use router::ProviderRouter;
