//! Result tables and artifact naming.
//!
//! Benchmark and evaluated tables are CSV files in the results directory,
//! named with the timestamp of the run that created them.

use crate::dataset::Case;
use crate::error::{BenchError, Result};
use crate::section::{Brief, Section};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Column order of the benchmark output table.
pub const BENCHMARK_COLUMNS: [&str; 12] = [
    "model_id",
    "case_name",
    "ai_facts",
    "ai_issue",
    "ai_decision",
    "ai_reasons",
    "ai_ratio",
    "human_facts",
    "human_issue",
    "human_decision",
    "human_reasons",
    "human_ratio",
];

/// File name prefix of benchmark output tables.
pub const BENCHMARK_PREFIX: &str = "case_model_results_";
/// File name prefix of evaluated tables.
pub const EVALUATED_PREFIX: &str = "evaluated_";

/// One (model, case) row of benchmark output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    #[serde(alias = "Model_ID")]
    pub model_id: String,
    #[serde(alias = "Case_Name")]
    pub case_name: String,
    #[serde(default)]
    pub ai_facts: String,
    #[serde(default)]
    pub ai_issue: String,
    #[serde(default)]
    pub ai_decision: String,
    #[serde(default)]
    pub ai_reasons: String,
    #[serde(default)]
    pub ai_ratio: String,
    #[serde(default)]
    pub human_facts: String,
    #[serde(default)]
    pub human_issue: String,
    #[serde(default)]
    pub human_decision: String,
    #[serde(default)]
    pub human_reasons: String,
    #[serde(default)]
    pub human_ratio: String,
}

impl BenchmarkResult {
    /// Build a row from the AI brief and the case's human brief.
    pub fn new(model_id: &str, case: &Case, ai: &Brief) -> Self {
        Self {
            model_id: model_id.to_string(),
            case_name: case.case_name.clone(),
            ai_facts: ai.facts.clone(),
            ai_issue: ai.issue.clone(),
            ai_decision: ai.decision.clone(),
            ai_reasons: ai.reasons.clone(),
            ai_ratio: ai.ratio.clone(),
            human_facts: case.human_facts.clone(),
            human_issue: case.human_issue.clone(),
            human_decision: case.human_decision.clone(),
            human_reasons: case.human_reasons.clone(),
            human_ratio: case.human_ratio.clone(),
        }
    }

    pub fn ai(&self, section: Section) -> &str {
        match section {
            Section::Facts => &self.ai_facts,
            Section::Issue => &self.ai_issue,
            Section::Decision => &self.ai_decision,
            Section::Reasons => &self.ai_reasons,
            Section::Ratio => &self.ai_ratio,
        }
    }

    pub fn human(&self, section: Section) -> &str {
        match section {
            Section::Facts => &self.human_facts,
            Section::Issue => &self.human_issue,
            Section::Decision => &self.human_decision,
            Section::Reasons => &self.human_reasons,
            Section::Ratio => &self.human_ratio,
        }
    }

    /// True when the model produced nothing for this row.
    pub fn ai_is_empty(&self) -> bool {
        Section::ALL.iter().all(|s| self.ai(*s).is_empty())
    }

    fn record(&self) -> [&str; 12] {
        [
            &self.model_id,
            &self.case_name,
            &self.ai_facts,
            &self.ai_issue,
            &self.ai_decision,
            &self.ai_reasons,
            &self.ai_ratio,
            &self.human_facts,
            &self.human_issue,
            &self.human_decision,
            &self.human_reasons,
            &self.human_ratio,
        ]
    }
}

/// A benchmark row with one similarity score per section.
///
/// `None` is the "not comparable" sentinel: one side was empty.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedResult {
    pub result: BenchmarkResult,
    pub scores: [Option<f64>; 5],
}

impl EvaluatedResult {
    pub fn score(&self, section: Section) -> Option<f64> {
        self.scores[section.index()]
    }
}

/// Header of the evaluated table: benchmark columns then similarity columns.
pub fn evaluated_columns() -> Vec<String> {
    BENCHMARK_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(Section::ALL.iter().map(|s| s.similarity_column()))
        .collect()
}

/// Render a score cell. The sentinel is an empty cell.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) if value.is_finite() => value.to_string(),
        _ => String::new(),
    }
}

/// Read a score cell. Empty, `NaN` and `None` cells are the sentinel.
pub fn parse_score(cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell == "None" {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|_| BenchError::Input(format!("Invalid similarity score '{}'", cell)))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Append-only writer for the benchmark output table.
///
/// Every appended row is flushed so that an interrupted run keeps all
/// rows written so far.
pub struct ResultTableWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl ResultTableWriter {
    /// Create the table and write its header.
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(BENCHMARK_COLUMNS)?;
        writer.flush().map_err(|e| BenchError::io(path, e))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn append(&mut self, row: &BenchmarkResult) -> Result<()> {
        self.writer.write_record(row.record())?;
        self.writer
            .flush()
            .map_err(|e| BenchError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended so far.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    if !path.exists() {
        return Err(BenchError::Input(format!(
            "Table not found at '{}'",
            path.display()
        )));
    }
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| BenchError::Input(format!("Failed to open '{}': {}", path.display(), e)))
}

fn check_columns(headers: &csv::StringRecord, required: &[String], path: &Path) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|col| !headers.iter().any(|h| h == col.as_str()))
        .map(|s| s.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(BenchError::Input(format!(
            "'{}' is missing required columns: {}",
            path.display(),
            missing.join(", ")
        )))
    }
}

fn benchmark_required_columns(headers: &csv::StringRecord) -> Vec<String> {
    let has = |a: &str, b: &str| headers.iter().any(|h| h == a || h == b);
    let mut required = Vec::new();
    if !has("model_id", "Model_ID") {
        required.push("model_id".to_string());
    }
    if !has("case_name", "Case_Name") {
        required.push("case_name".to_string());
    }
    for section in Section::ALL {
        required.push(section.ai_column());
        required.push(section.human_column());
    }
    required
}

/// Read a benchmark output table.
pub fn read_benchmark_table(path: &Path) -> Result<Vec<BenchmarkResult>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    check_columns(&headers, &benchmark_required_columns(&headers), path)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row: BenchmarkResult = record.deserialize(Some(&headers)).map_err(|e| {
            BenchError::Input(format!(
                "Malformed row {} in '{}': {}",
                idx + 1,
                path.display(),
                e
            ))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write an evaluated table.
pub fn write_evaluated_table(rows: &[EvaluatedResult], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(evaluated_columns())?;

    for row in rows {
        let mut record: Vec<String> = row.result.record().iter().map(|s| s.to_string()).collect();
        record.extend(row.scores.iter().map(|s| format_score(*s)));
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|e| BenchError::io(path, e))?;
    Ok(())
}

/// Read an evaluated table.
pub fn read_evaluated_table(path: &Path) -> Result<Vec<EvaluatedResult>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();

    let mut required = benchmark_required_columns(&headers);
    required.extend(Section::ALL.iter().map(|s| s.similarity_column()));
    check_columns(&headers, &required, path)?;

    let score_idx: Vec<usize> = Section::ALL
        .iter()
        .map(|s| {
            let col = s.similarity_column();
            headers.iter().position(|h| h == col).unwrap_or_default()
        })
        .collect();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let result: BenchmarkResult = record.deserialize(Some(&headers)).map_err(|e| {
            BenchError::Input(format!(
                "Malformed row {} in '{}': {}",
                idx + 1,
                path.display(),
                e
            ))
        })?;

        let mut scores = [None; 5];
        for (slot, col) in scores.iter_mut().zip(&score_idx) {
            *slot = parse_score(record.get(*col).unwrap_or(""))?;
        }

        rows.push(EvaluatedResult { result, scores });
    }
    Ok(rows)
}

/// Timestamp used in artifact names (sorts chronologically as text).
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Path for a new benchmark output table.
pub fn benchmark_output_path(results_dir: &Path) -> PathBuf {
    results_dir.join(format!("{}{}.csv", BENCHMARK_PREFIX, timestamp()))
}

/// Path of the evaluated table derived from a benchmark table.
pub fn evaluated_output_path(input: &Path, results_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    results_dir.join(format!("{}{}.csv", EVALUATED_PREFIX, stem))
}

/// Most recent artifact in `dir` matching a glob `pattern`.
///
/// Artifact names embed a sortable timestamp, so the greatest file name
/// is the newest.
pub fn latest_artifact(dir: &Path, pattern: &str) -> Result<PathBuf> {
    let full = dir.join(pattern);
    let full = full.to_string_lossy();

    let entries = glob::glob(&full)
        .map_err(|e| BenchError::Input(format!("Invalid pattern '{}': {}", pattern, e)))?;

    entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .max_by(|a, b| a.file_name().cmp(&b.file_name()))
        .ok_or_else(|| {
            BenchError::Input(format!(
                "No file matching '{}' in '{}'",
                pattern,
                dir.display()
            ))
        })
}
