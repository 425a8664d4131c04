//! Case Brief Bench CLI
//!
//! Benchmark LLM providers on case briefs and score them against human briefs.

use anyhow::{Context, Result};
use case_brief_bench::{
    chart,
    config::{Config, FailurePolicy},
    dataset::{human_section_coverage, load_cases, load_scraper_export, write_cases_csv},
    llm::{
        CatalogClient, CatalogStats, LlmClient, ProviderRouter, catalog_output_path, ping,
        write_catalog_csv,
    },
    registry::{Provider, load_models},
    runner::{BenchmarkRunner, RunnerOptions},
    section::Section,
    table::{
        BENCHMARK_PREFIX, EVALUATED_PREFIX, ResultTableWriter, benchmark_output_path,
        evaluated_output_path, latest_artifact, read_evaluated_table,
    },
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Case Brief Bench - compare LLM case briefs against human-written ones
#[derive(Parser)]
#[command(name = "case-brief-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the cases table from a scraper JSON export
    Prepare {
        /// Path to the scraper export (JSON array of {title, details})
        export: PathBuf,

        /// Output path for the cases table (defaults to the configured cases path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep only the first N usable cases, in export order (not a random sample)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Export the clod.io model catalog as a registry CSV
    Models {
        /// Router base URL
        #[arg(long)]
        endpoint: Option<String>,

        /// Environment variable holding the router API key
        #[arg(long)]
        api_key_env: Option<String>,

        /// Output path (defaults to ai_models_<timestamp>.csv next to the model registry)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ask every model for a brief of every case
    Run(RunArgs),

    /// Score AI sections against human sections
    Evaluate {
        /// Benchmark table (defaults to the newest in the results directory)
        input: Option<PathBuf>,

        /// Glob used to find the newest benchmark table
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Summarize and chart an evaluated table
    Chart {
        /// Evaluated table (defaults to the newest in the results directory)
        input: Option<PathBuf>,

        /// Glob used to find the newest evaluated table
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Check connectivity to each model
    Test {
        /// Path to the model registry
        #[arg(long)]
        models: Option<PathBuf>,

        /// Only test this model id
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to the cases table
    #[arg(long)]
    cases: Option<PathBuf>,

    /// Path to the model registry
    #[arg(long)]
    models: Option<PathBuf>,

    /// Calls in flight at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Leave failed rows out of the output instead of recording them empty
    #[arg(long)]
    skip_failed: bool,

    /// Evaluate the output as soon as the run finishes
    #[arg(long)]
    evaluate: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare {
            export,
            output,
            limit,
        } => cmd_prepare(&export, output, limit),
        Commands::Models {
            endpoint,
            api_key_env,
            output,
        } => cmd_models(endpoint, api_key_env, output).await,
        Commands::Run(args) => cmd_run(args).await,
        Commands::Evaluate { input, pattern } => cmd_evaluate(input, pattern),
        Commands::Chart { input, pattern } => cmd_chart(input, pattern),
        Commands::Test { models, model } => cmd_test(models, model).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration")
}

fn cmd_prepare(export: &Path, output: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let output = match output {
        Some(path) => path,
        None => load_config()?.run.cases_path,
    };

    let cases = load_scraper_export(export, limit)
        .with_context(|| format!("Failed to read scraper export '{}'", export.display()))?;
    if cases.is_empty() {
        anyhow::bail!(
            "No case in '{}' has a human brief; nothing to write",
            export.display()
        );
    }

    write_cases_csv(&cases, &output).context("Failed to write cases table")?;

    println!("Wrote {} cases to {}", cases.len(), output.display());
    let coverage = human_section_coverage(&cases);
    for section in Section::ALL {
        println!(
            "  {:<9} {:>5} / {}",
            section.name(),
            coverage[section.index()],
            cases.len()
        );
    }

    Ok(())
}

async fn cmd_models(
    endpoint: Option<String>,
    api_key_env: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let endpoint = endpoint.unwrap_or_else(|| Provider::Clod.default_endpoint().to_string());
    let key_env = api_key_env.unwrap_or_else(|| Provider::Clod.default_api_key_env().to_string());
    let api_key = std::env::var(&key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .with_context(|| format!("{} is not set", key_env))?;

    let output = output.unwrap_or_else(|| {
        let dir = config
            .run
            .models_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        catalog_output_path(&dir)
    });

    println!("Fetching model catalog from {}", endpoint);
    let client = CatalogClient::new(config.run.timeout()).context("Failed to create HTTP client")?;
    let models = client
        .fetch(&endpoint, &api_key)
        .await
        .context("Failed to fetch model catalog")?;

    write_catalog_csv(&models, &output).context("Failed to write model catalog")?;
    println!("Wrote {} models to {}\n", models.len(), output.display());
    CatalogStats::from_models(&models).print();
    Ok(())
}

/// Fail before any provider call when `--evaluate` cannot be honored.
fn ensure_evaluation_available() -> Result<()> {
    if cfg!(feature = "embeddings") {
        Ok(())
    } else {
        anyhow::bail!(
            "--evaluate needs an embedding model; rebuild with `--features embeddings` or run without it"
        )
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    if args.evaluate {
        ensure_evaluation_available()?;
    }

    let mut config = load_config()?;
    if let Some(path) = args.cases {
        config.run.cases_path = path;
    }
    if let Some(path) = args.models {
        config.run.models_path = path;
    }
    if let Some(concurrency) = args.concurrency {
        config.run.concurrency = concurrency;
    }
    if let Some(timeout) = args.timeout {
        config.run.timeout_secs = timeout;
    }
    if args.skip_failed {
        config.run.failure_policy = FailurePolicy::Skip;
    }
    config.validate().context("Invalid configuration")?;

    let cases = load_cases(&config.run.cases_path).context("Failed to load cases")?;
    let models = load_models(&config.run.models_path).context("Failed to load model registry")?;

    let client = Arc::new(
        ProviderRouter::new(config.run.timeout()).context("Failed to create HTTP client")?,
    );
    let runner = BenchmarkRunner::new(client, RunnerOptions::from(&config.run));

    let output = benchmark_output_path(&config.run.results_dir);
    let mut writer = ResultTableWriter::create(&output).context("Failed to create results table")?;

    println!(
        "Benchmarking {} models on {} cases ({} calls)",
        models.len(),
        cases.len(),
        models.len() * cases.len()
    );
    println!("Writing rows to {}", output.display());

    let start = Instant::now();
    let finished = tokio::select! {
        result = runner.run_with_sink(&cases, &models, &mut writer) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(result) = finished else {
        warn!(rows = writer.rows(), path = %output.display(), "run interrupted");
        anyhow::bail!(
            "Interrupted; {} rows were saved to '{}'",
            writer.rows(),
            output.display()
        );
    };
    let summary = result.context("Benchmark run aborted")?;

    println!("\nRun complete in {:.2?}", start.elapsed());
    println!("  Attempted:  {}", summary.attempted);
    println!("  Complete:   {}", summary.complete);
    println!("  Partial:    {}", summary.partial);
    println!("  Failed:     {}", summary.failed);
    if summary.skipped > 0 {
        println!("  Skipped:    {}", summary.skipped);
    }
    println!("  Written:    {}", summary.written);
    println!("Results saved to {}", output.display());

    if args.evaluate {
        let evaluated = evaluate_table(&output, &config)?;
        println!("Evaluated results saved to {}", evaluated.display());
    }

    Ok(())
}

fn resolve_input(
    input: Option<PathBuf>,
    pattern: Option<String>,
    dir: &Path,
    prefix: &str,
) -> Result<PathBuf> {
    match input {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!("Input table not found at '{}'", path.display());
            }
            Ok(path)
        }
        None => {
            let pattern = pattern.unwrap_or_else(|| format!("{}*.csv", prefix));
            let path = latest_artifact(dir, &pattern).context("No input table found")?;
            info!(path = %path.display(), "using most recent table");
            Ok(path)
        }
    }
}

fn cmd_evaluate(input: Option<PathBuf>, pattern: Option<String>) -> Result<()> {
    let config = load_config()?;
    config.validate().context("Invalid configuration")?;

    let input = resolve_input(input, pattern, &config.run.results_dir, BENCHMARK_PREFIX)?;
    let output = evaluate_table(&input, &config)?;

    println!("Evaluated results saved to {}", output.display());
    Ok(())
}

#[cfg(feature = "embeddings")]
fn evaluate_table(input: &Path, config: &Config) -> Result<PathBuf> {
    use case_brief_bench::{
        BenchError,
        eval::{Embedder, LazyEmbedder, LocalEmbedder, SimilarityEvaluator},
    };

    let embedding = config.embedding.clone();
    let embedder = LazyEmbedder::new(config.embedding.model_id.clone(), move || {
        let model = LocalEmbedder::load(&embedding)
            .map_err(|e| BenchError::Embedding(format!("{:#}", e)))?;
        Ok(Box::new(model) as Box<dyn Embedder>)
    });
    embedder
        .ensure_loaded()
        .context("Failed to load embedding model")?;

    let output = evaluated_output_path(input, &config.run.results_dir);
    let start = Instant::now();
    let evaluated = SimilarityEvaluator::new(&embedder)
        .evaluate_file(input, &output)
        .context("Evaluation failed")?;

    println!(
        "Scored {} rows with {} in {:.2?}",
        evaluated.len(),
        embedder.name(),
        start.elapsed()
    );
    Ok(output)
}

#[cfg(not(feature = "embeddings"))]
fn evaluate_table(input: &Path, config: &Config) -> Result<PathBuf> {
    let output = evaluated_output_path(input, &config.run.results_dir);
    anyhow::bail!(
        "Cannot write '{}': this build has no embedding model; rebuild with `--features embeddings`",
        output.display()
    )
}

fn cmd_chart(input: Option<PathBuf>, pattern: Option<String>) -> Result<()> {
    let config = load_config()?;

    let input = resolve_input(input, pattern, &config.run.results_dir, EVALUATED_PREFIX)?;
    let evaluated = read_evaluated_table(&input).context("Failed to read evaluated table")?;

    let summaries = chart::aggregate(&evaluated);
    println!("Average similarity by model ({})\n", input.display());
    chart::print_summary(&summaries);

    let path = chart::render(&evaluated, &config.run.charts_dir).context("Failed to render chart")?;
    println!("\nChart saved to {}", path.display());
    Ok(())
}

async fn cmd_test(models_path: Option<PathBuf>, only: Option<String>) -> Result<()> {
    let config = load_config()?;
    let path = models_path.unwrap_or(config.run.models_path.clone());
    let mut models = load_models(&path).context("Failed to load model registry")?;

    if let Some(id) = &only {
        models.retain(|m| &m.model_id == id);
        if models.is_empty() {
            anyhow::bail!("Model '{}' is not in '{}'", id, path.display());
        }
    }

    let client = ProviderRouter::new(config.run.timeout()).context("Failed to create HTTP client")?;

    println!("Testing {} models...\n", models.len());
    let mut failures = 0;
    for model in &models {
        print!("  {:<30} {:<10} ", model.model_id, model.provider.as_str());
        match ping(&client as &dyn LlmClient, model).await {
            Ok(()) => println!("ok"),
            Err(e) => {
                failures += 1;
                println!("FAILED [{}] {}", e.kind(), e);
            }
        }
    }

    println!("\n{} of {} models reachable", models.len() - failures, models.len());
    Ok(())
}
