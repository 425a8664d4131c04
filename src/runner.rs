//! Benchmark runner: every model briefs every case.
//!
//! Calls run on a bounded pool of in-flight futures. Completed rows are
//! handed to a single [`RowSink`] by the task driving the pool, so writes
//! never interleave. A failed call only affects its own row.

use crate::brief::parse_brief;
use crate::config::{FailurePolicy, RunConfig};
use crate::dataset::Case;
use crate::error::{BenchError, Result};
use crate::llm::{LlmClient, Prompts};
use crate::registry::ModelConfig;
use crate::section::Brief;
use crate::table::{BenchmarkResult, ResultTableWriter};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Destination for completed rows.
pub trait RowSink {
    fn append(&mut self, row: &BenchmarkResult) -> Result<()>;
}

impl RowSink for Vec<BenchmarkResult> {
    fn append(&mut self, row: &BenchmarkResult) -> Result<()> {
        self.push(row.clone());
        Ok(())
    }
}

impl RowSink for ResultTableWriter {
    fn append(&mut self, row: &BenchmarkResult) -> Result<()> {
        ResultTableWriter::append(self, row)
    }
}

/// Options for a benchmark run.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Calls in flight at once.
    pub concurrency: usize,
    /// Upper bound on one call.
    pub timeout: Duration,
    /// Pause before each call.
    pub request_delay: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunnerOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            timeout: config.timeout(),
            request_delay: config.request_delay(),
            failure_policy: config.failure_policy,
        }
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// (model, case) pairs attempted.
    pub attempted: usize,
    /// Rows with all five sections parsed.
    pub complete: usize,
    /// Rows where some sections could not be parsed.
    pub partial: usize,
    /// Rows whose call failed.
    pub failed: usize,
    /// Failed rows left out under [`FailurePolicy::Skip`].
    pub skipped: usize,
    /// Rows handed to the sink.
    pub written: usize,
}

/// How a single row ended.
#[derive(Debug)]
enum RowOutcome {
    Complete,
    Partial,
    Failed,
}

/// Runs the (model, case) cross product against an LLM client.
pub struct BenchmarkRunner {
    client: Arc<dyn LlmClient>,
    options: RunnerOptions,
}

impl BenchmarkRunner {
    pub fn new(client: Arc<dyn LlmClient>, options: RunnerOptions) -> Self {
        Self { client, options }
    }

    /// Run every model on every case and collect the rows in memory.
    pub async fn run(&self, cases: &[Case], models: &[ModelConfig]) -> Vec<BenchmarkResult> {
        let mut rows = Vec::new();
        if let Err(e) = self.run_with_sink(cases, models, &mut rows).await {
            // Vec sinks do not fail
            warn!(error = %e, "in-memory run stopped early");
        }
        rows
    }

    /// Run every model on every case, appending each row to `sink` as it completes.
    ///
    /// Row-level failures are logged and recorded; only a sink failure
    /// aborts the run.
    pub async fn run_with_sink(
        &self,
        cases: &[Case],
        models: &[ModelConfig],
        sink: &mut dyn RowSink,
    ) -> Result<RunSummary> {
        let total = cases.len() * models.len();
        let start = Instant::now();
        let mut summary = RunSummary::default();

        info!(
            models = models.len(),
            cases = cases.len(),
            concurrency = self.options.concurrency,
            "starting benchmark run"
        );

        let pairs = models
            .iter()
            .flat_map(|model| cases.iter().map(move |case| (model, case)));

        let mut completed = stream::iter(pairs)
            .map(|(model, case)| self.run_row(model, case))
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some((row, outcome)) = completed.next().await {
            summary.attempted += 1;

            match outcome {
                RowOutcome::Complete => summary.complete += 1,
                RowOutcome::Partial => summary.partial += 1,
                RowOutcome::Failed => summary.failed += 1,
            }

            if matches!(outcome, RowOutcome::Failed)
                && self.options.failure_policy == FailurePolicy::Skip
            {
                summary.skipped += 1;
            } else {
                sink.append(&row)?;
                summary.written += 1;
            }

            info!(
                progress = %format!("{}/{}", summary.attempted, total),
                model_id = %row.model_id,
                case_name = %row.case_name,
                outcome = ?outcome,
                "row finished"
            );
        }

        info!(
            attempted = summary.attempted,
            complete = summary.complete,
            partial = summary.partial,
            failed = summary.failed,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "benchmark run finished"
        );

        Ok(summary)
    }

    /// Brief one case with one model. Never fails: errors become empty AI fields.
    async fn run_row(&self, model: &ModelConfig, case: &Case) -> (BenchmarkResult, RowOutcome) {
        if !self.options.request_delay.is_zero() {
            tokio::time::sleep(self.options.request_delay).await;
        }

        let prompt = Prompts::case_brief(case);
        let call = self.client.generate(&prompt, model);

        let response = match tokio::time::timeout(self.options.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Self::failed_row(model, case, e),
            Err(_) => return Self::failed_row(model, case, BenchError::Timeout(self.options.timeout)),
        };

        let parsed = parse_brief(&response);
        let outcome = match parsed.error() {
            None => RowOutcome::Complete,
            Some(e) => {
                warn!(
                    model_id = %model.model_id,
                    case_name = %case.case_name,
                    kind = e.kind(),
                    error = %e,
                    "response only partly parsed"
                );
                if parsed.brief.is_empty() {
                    RowOutcome::Failed
                } else {
                    RowOutcome::Partial
                }
            }
        };

        (
            BenchmarkResult::new(&model.model_id, case, &parsed.brief),
            outcome,
        )
    }

    fn failed_row(model: &ModelConfig, case: &Case, error: BenchError) -> (BenchmarkResult, RowOutcome) {
        warn!(
            model_id = %model.model_id,
            case_name = %case.case_name,
            kind = error.kind(),
            error = %error,
            "row failed"
        );
        (
            BenchmarkResult::new(&model.model_id, case, &Brief::default()),
            RowOutcome::Failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Provider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoCaseClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for EchoCaseClient {
        async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let case_line = prompt
                .lines()
                .find(|l| l.starts_with("Case: "))
                .unwrap_or_default();
            Ok(format!(
                "FACTS: {}\nISSUE: by {}\nDECISION: d\nREASONS: r\nRATIO: ra",
                case_line, config.model_id
            ))
        }
    }

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn generate(&self, _prompt: &str, _config: &ModelConfig) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("FACTS: too late".to_string())
        }
    }

    struct PartialClient;

    #[async_trait]
    impl LlmClient for PartialClient {
        async fn generate(&self, _prompt: &str, _config: &ModelConfig) -> Result<String> {
            Ok("FACTS: only facts".to_string())
        }
    }

    fn cases(n: usize) -> Vec<Case> {
        (1..=n)
            .map(|i| Case {
                case_id: i.to_string(),
                case_name: format!("Case {}", i),
                source_text: format!("text {}", i),
                human_facts: format!("hf{}", i),
                human_issue: format!("hi{}", i),
                human_decision: format!("hd{}", i),
                human_reasons: format!("hr{}", i),
                human_ratio: format!("hra{}", i),
            })
            .collect()
    }

    fn models(n: usize) -> Vec<ModelConfig> {
        (1..=n)
            .map(|i| ModelConfig::new(format!("model-{}", i), Provider::OpenAi))
            .collect()
    }

    #[tokio::test]
    async fn test_cross_product_with_pool() {
        let client = Arc::new(EchoCaseClient {
            calls: AtomicUsize::new(0),
        });
        let runner = BenchmarkRunner::new(
            client.clone(),
            RunnerOptions {
                concurrency: 4,
                ..Default::default()
            },
        );

        let rows = runner.run(&cases(3), &models(2)).await;
        assert_eq!(rows.len(), 6);
        assert_eq!(client.calls.load(Ordering::SeqCst), 6);

        for row in &rows {
            // Each row's AI text comes from its own (model, case) call
            assert_eq!(row.ai_facts, format!("Case: {}", row.case_name));
            assert_eq!(row.ai_issue, format!("by {}", row.model_id));
            let idx = row.case_name.trim_start_matches("Case ");
            assert_eq!(row.human_ratio, format!("hra{}", idx));
        }
    }

    #[tokio::test]
    async fn test_runner_timeout_is_row_scoped() {
        let runner = BenchmarkRunner::new(
            Arc::new(SlowClient),
            RunnerOptions {
                concurrency: 2,
                timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let mut rows = Vec::new();
        let summary = runner
            .run_with_sink(&cases(2), &models(1), &mut rows)
            .await
            .unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.written, 2);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.ai_is_empty()));
    }

    #[tokio::test]
    async fn test_skip_policy_drops_failed_rows() {
        let runner = BenchmarkRunner::new(
            Arc::new(SlowClient),
            RunnerOptions {
                timeout: Duration::from_millis(10),
                failure_policy: FailurePolicy::Skip,
                ..Default::default()
            },
        );

        let mut rows = Vec::new();
        let summary = runner
            .run_with_sink(&cases(2), &models(2), &mut rows)
            .await
            .unwrap();

        assert_eq!(summary.attempted, 4);
        assert_eq!(summary.skipped, 4);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_partial_parse_keeps_found_sections() {
        let runner = BenchmarkRunner::new(Arc::new(PartialClient), RunnerOptions::default());

        let mut rows = Vec::new();
        let summary = runner
            .run_with_sink(&cases(1), &models(1), &mut rows)
            .await
            .unwrap();

        assert_eq!(summary.partial, 1);
        assert_eq!(rows[0].ai_facts, "only facts");
        assert_eq!(rows[0].ai_ratio, "");
        assert_eq!(rows[0].human_facts, "hf1");
    }

    #[test]
    fn test_options_from_config() {
        let mut config = RunConfig::default();
        config.concurrency = 0;
        config.timeout_secs = 5;
        let options = RunnerOptions::from(&config);
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.timeout, Duration::from_secs(5));
    }
}
