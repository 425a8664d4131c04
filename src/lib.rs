//! Case Brief Bench - benchmark LLMs on Canadian case briefs.
//!
//! Each model in a registry is asked for a five-section brief (facts,
//! issue, decision, reasons, ratio) of each case in a dataset. The AI
//! sections are scored against human-written briefs with sentence
//! embeddings, and the per-model averages are charted.
//!
//! # Pipeline
//!
//! 1. [`dataset`]: load cases (CSV, JSON, or a normalized scraper export)
//! 2. [`registry`]: load the models to benchmark
//! 3. [`runner`]: query every model on every case, streaming rows to a
//!    [`table::ResultTableWriter`]
//! 4. [`eval`]: cosine similarity per section between AI and human text
//! 5. [`chart`]: per-model means, printed and rendered as SVG
//!
//! ```no_run
//! use case_brief_bench::{
//!     config::Config,
//!     dataset::load_cases,
//!     llm::ProviderRouter,
//!     registry::load_models,
//!     runner::{BenchmarkRunner, RunnerOptions},
//!     table::{ResultTableWriter, benchmark_output_path},
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let cases = load_cases(Path::new("data/cases.csv"))?;
//!     let models = load_models(Path::new("models.csv"))?;
//!
//!     let client = Arc::new(ProviderRouter::new(config.run.timeout())?);
//!     let runner = BenchmarkRunner::new(client, RunnerOptions::from(&config.run));
//!
//!     let mut writer = ResultTableWriter::create(&benchmark_output_path(&config.run.results_dir))?;
//!     let summary = runner.run_with_sink(&cases, &models, &mut writer).await?;
//!     println!("{} rows written to {}", summary.written, writer.path().display());
//!     Ok(())
//! }
//! ```

pub mod brief;
pub mod chart;
pub mod config;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod llm;
pub mod registry;
pub mod runner;
pub mod section;
pub mod table;

pub use brief::{ParsedBrief, parse_brief};
pub use config::Config;
pub use dataset::Case;
pub use error::{BenchError, Result};
pub use registry::{ModelConfig, Provider};
pub use runner::{BenchmarkRunner, RunSummary, RunnerOptions};
pub use section::{Brief, Section};
pub use table::{BenchmarkResult, EvaluatedResult};
