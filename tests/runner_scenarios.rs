use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use case_brief_bench::config::FailurePolicy;
use case_brief_bench::dataset::Case;
use case_brief_bench::llm::{LlmClient, ProviderRouter};
use case_brief_bench::registry::{ModelConfig, Provider};
use case_brief_bench::runner::{BenchmarkRunner, RunnerOptions};
use case_brief_bench::table::{ResultTableWriter, read_benchmark_table};
use case_brief_bench::{BenchError, Result};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIXED_RESPONSE: &str = "FACTS: The accused was stopped at a checkpoint.\n\
ISSUE: Was the detention arbitrary?\n\
DECISION: Appeal dismissed.\n\
REASONS: The stop was authorized by statute.\n\
RATIO: Random stops authorized by law are justified under s. 1.";

struct FixedClient;

#[async_trait]
impl LlmClient for FixedClient {
    async fn generate(&self, _prompt: &str, _config: &ModelConfig) -> Result<String> {
        Ok(FIXED_RESPONSE.to_string())
    }
}

struct TimeoutClient {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for TimeoutClient {
    async fn generate(&self, _prompt: &str, _config: &ModelConfig) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BenchError::Timeout(Duration::from_secs(60)))
    }
}

fn case(i: usize) -> Case {
    Case {
        case_id: i.to_string(),
        case_name: format!("R v Example {}", i),
        source_text: String::new(),
        human_facts: format!("Human facts, with a comma, for case {}", i),
        human_issue: "Was the search \"reasonable\"?".to_string(),
        human_decision: "Appeal allowed.\nNew trial ordered.".to_string(),
        human_reasons: format!("Reasons {}", i),
        human_ratio: format!("Ratio {}", i),
    }
}

fn model(id: &str) -> ModelConfig {
    ModelConfig::new(id, Provider::OpenAi).with_api_key("sk-test")
}

#[tokio::test]
async fn fixed_stub_fills_ai_and_keeps_human_verbatim() {
    let cases = vec![case(1), case(2)];
    let runner = BenchmarkRunner::new(Arc::new(FixedClient), RunnerOptions::default());

    let rows = runner.run(&cases, &[model("stub")]).await;
    assert_eq!(rows.len(), 2);

    for (row, case) in rows.iter().zip(&cases) {
        assert_eq!(row.model_id, "stub");
        assert_eq!(row.case_name, case.case_name);
        assert_eq!(row.ai_facts, "The accused was stopped at a checkpoint.");
        assert_eq!(row.ai_decision, "Appeal dismissed.");
        assert!(row.ai_ratio.starts_with("Random stops"));
        assert_eq!(row.human_facts, case.human_facts);
        assert_eq!(row.human_issue, case.human_issue);
        assert_eq!(row.human_decision, case.human_decision);
    }
}

#[tokio::test]
async fn timeouts_record_empty_rows() {
    let client = Arc::new(TimeoutClient {
        calls: AtomicUsize::new(0),
    });
    let runner = BenchmarkRunner::new(client.clone(), RunnerOptions::default());
    let cases = vec![case(1), case(2), case(3)];

    let mut rows = Vec::new();
    let summary = runner
        .run_with_sink(&cases, &[model("slow")], &mut rows)
        .await
        .unwrap();

    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.failed, 3);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.ai_is_empty()));
    assert!(rows.iter().all(|r| r.human_ratio.starts_with("Ratio")));
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn timeouts_log_one_warning_per_row() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let client = Arc::new(TimeoutClient {
        calls: AtomicUsize::new(0),
    });
    let runner = BenchmarkRunner::new(client, RunnerOptions::default());
    let cases = vec![case(1), case(2), case(3)];

    let mut rows = Vec::new();
    runner
        .run_with_sink(&cases, &[model("slow")], &mut rows)
        .await
        .unwrap();

    let text = logs.text();
    let failures: Vec<&str> = text.lines().filter(|l| l.contains("row failed")).collect();
    assert_eq!(failures.len(), 3, "log output:\n{text}");

    for c in &cases {
        let needle = format!("case_name={} ", c.case_name);
        let matching: Vec<&&str> = failures.iter().filter(|l| l.contains(&needle)).collect();
        assert_eq!(matching.len(), 1, "no single warning for {}", c.case_name);

        let line = matching[0];
        assert!(line.contains("WARN"));
        assert!(line.contains("model_id=slow"));
        assert!(
            line.contains("kind=\"timeout\"") || line.contains("kind=timeout"),
            "missing kind: {line}"
        );
    }
}

#[tokio::test]
async fn every_pair_gets_a_row_even_when_all_fail() {
    let client = Arc::new(TimeoutClient {
        calls: AtomicUsize::new(0),
    });
    let runner = BenchmarkRunner::new(
        client,
        RunnerOptions {
            concurrency: 3,
            ..Default::default()
        },
    );
    let cases: Vec<Case> = (1..=4).map(case).collect();
    let models = vec![model("a"), model("b"), model("c")];

    let rows = runner.run(&cases, &models).await;
    assert_eq!(rows.len(), 12);
    for m in &models {
        assert_eq!(rows.iter().filter(|r| r.model_id == m.model_id).count(), 4);
    }
}

#[tokio::test]
async fn skip_policy_writes_nothing_for_failures() {
    let client = Arc::new(TimeoutClient {
        calls: AtomicUsize::new(0),
    });
    let runner = BenchmarkRunner::new(
        client,
        RunnerOptions {
            failure_policy: FailurePolicy::Skip,
            ..Default::default()
        },
    );

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("case_model_results_2024-05-01_10-00-00.csv");
    let mut writer = ResultTableWriter::create(&output).unwrap();
    let summary = runner
        .run_with_sink(&[case(1)], &[model("a")], &mut writer)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(writer.rows(), 0);
    assert!(read_benchmark_table(&output).unwrap().is_empty());
}

#[tokio::test]
async fn streamed_table_reads_back() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("results").join("case_model_results_2024-05-01_10-00-00.csv");

    let runner = BenchmarkRunner::new(Arc::new(FixedClient), RunnerOptions::default());
    let cases = vec![case(1), case(2)];
    let mut writer = ResultTableWriter::create(&output).unwrap();
    let summary = runner
        .run_with_sink(&cases, &[model("a"), model("b")], &mut writer)
        .await
        .unwrap();
    assert_eq!(summary.written, 4);
    drop(writer);

    let rows = read_benchmark_table(&output).unwrap();
    assert_eq!(rows.len(), 4);
    let row = rows
        .iter()
        .find(|r| r.model_id == "b" && r.case_name == "R v Example 2")
        .unwrap();
    assert_eq!(row.human_decision, "Appeal allowed.\nNew trial ordered.");
    assert_eq!(row.human_issue, "Was the search \"reasonable\"?");
    assert_eq!(row.ai_issue, "Was the detention arbitrary?");
}

#[tokio::test]
async fn end_to_end_against_mock_provider() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": FIXED_RESPONSE }, "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    let good = model("good").with_endpoint(server.uri());
    let keyless = ModelConfig::new("keyless", Provider::OpenAi)
        .with_endpoint(server.uri())
        .with_api_key_env("CASE_BRIEF_BENCH_RUNNER_UNSET_KEY");

    let router = ProviderRouter::new(Duration::from_secs(5)).unwrap();
    let runner = BenchmarkRunner::new(
        Arc::new(router),
        RunnerOptions {
            concurrency: 2,
            ..Default::default()
        },
    );

    let mut rows = Vec::new();
    let summary = runner
        .run_with_sink(&[case(1), case(2)], &[good, keyless], &mut rows)
        .await
        .unwrap();

    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.complete, 2);
    assert_eq!(summary.failed, 2);
    assert!(
        rows.iter()
            .filter(|r| r.model_id == "keyless")
            .all(|r| r.ai_is_empty())
    );
    assert!(
        rows.iter()
            .filter(|r| r.model_id == "good")
            .all(|r| r.ai_reasons == "The stop was authorized by statute.")
    );
}
