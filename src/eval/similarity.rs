//! Section-by-section similarity between AI and human briefs.

use crate::error::{BenchError, Result};
use crate::section::Section;
use crate::table::{BenchmarkResult, EvaluatedResult, read_benchmark_table, write_evaluated_table};
use rayon::prelude::*;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Turns text into a sentence embedding.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier of the underlying model, for logs.
    fn name(&self) -> &str;
}

type Loader = Box<dyn Fn() -> Result<Box<dyn Embedder>> + Send + Sync>;

/// An embedder that loads its model on first use.
///
/// The load runs at most once, even when many threads ask at the same
/// time. A failed load is remembered and reported on every later call.
pub struct LazyEmbedder {
    name: String,
    loader: Loader,
    model: OnceLock<std::result::Result<Box<dyn Embedder>, String>>,
}

impl LazyEmbedder {
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Embedder>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            model: OnceLock::new(),
        }
    }

    /// Load the model now, surfacing a load failure to the caller.
    pub fn ensure_loaded(&self) -> Result<()> {
        self.model().map(|_| ())
    }

    /// Whether the model has been loaded (or failed to load).
    pub fn is_initialized(&self) -> bool {
        self.model.get().is_some()
    }

    fn model(&self) -> Result<&dyn Embedder> {
        let loaded = self.model.get_or_init(|| {
            info!(model = %self.name, "loading embedding model");
            (self.loader)().map_err(|e| e.to_string())
        });

        match loaded {
            Ok(model) => Ok(model.as_ref()),
            Err(msg) => Err(BenchError::Embedding(format!(
                "model '{}' failed to load: {}",
                self.name, msg
            ))),
        }
    }
}

impl Embedder for LazyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.model()?.embed(text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Cosine similarity, clamped to [-1, 1].
///
/// `None` when the vectors are empty, differ in length, or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }

    Some((dot / denom).clamp(-1.0, 1.0))
}

/// Scores AI sections against human sections with one shared embedder.
pub struct SimilarityEvaluator<'a> {
    embedder: &'a dyn Embedder,
}

impl<'a> SimilarityEvaluator<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder }
    }

    /// Similarity of two texts.
    ///
    /// `None` if either side is blank; exactly 1.0 for identical text.
    pub fn score_pair(&self, ai: &str, human: &str) -> Result<Option<f64>> {
        let (ai, human) = (ai.trim(), human.trim());
        if ai.is_empty() || human.is_empty() {
            return Ok(None);
        }
        if ai == human {
            return Ok(Some(1.0));
        }

        let u = self.embedder.embed(ai)?;
        let v = self.embedder.embed(human)?;
        Ok(cosine_similarity(&u, &v))
    }

    /// Score all five sections of one row.
    pub fn evaluate_row(&self, row: &BenchmarkResult) -> EvaluatedResult {
        let mut scores = [None; 5];
        for section in Section::ALL {
            scores[section.index()] = match self.score_pair(row.ai(section), row.human(section)) {
                Ok(score) => score,
                Err(e) => {
                    warn!(
                        model_id = %row.model_id,
                        case_name = %row.case_name,
                        section = %section,
                        error = %e,
                        "could not score section"
                    );
                    None
                }
            };
        }

        EvaluatedResult {
            result: row.clone(),
            scores,
        }
    }

    /// Score every row. Rows are scored in parallel; output keeps input order.
    pub fn evaluate(&self, results: &[BenchmarkResult]) -> Vec<EvaluatedResult> {
        info!(
            rows = results.len(),
            model = %self.embedder.name(),
            "evaluating section similarity"
        );
        results.par_iter().map(|row| self.evaluate_row(row)).collect()
    }

    /// Evaluate a benchmark table and write the evaluated table to `output`.
    pub fn evaluate_file(&self, input: &Path, output: &Path) -> Result<Vec<EvaluatedResult>> {
        let rows = read_benchmark_table(input)?;
        let evaluated = self.evaluate(&rows);

        write_evaluated_table(&evaluated, output)?;
        info!(input = %input.display(), output = %output.display(), "evaluation complete");
        Ok(evaluated)
    }
}
