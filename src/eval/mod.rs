//! Semantic similarity evaluation of benchmark results.
//!
//! - [`similarity`]: the [`Embedder`] seam, cosine scoring and the row evaluator
//! - [`embeddings`]: token windowing and, with the `embeddings` feature, a
//!   local candle sentence-transformer

pub mod embeddings;
pub mod similarity;

#[cfg(feature = "embeddings")]
pub use embeddings::LocalEmbedder;
pub use embeddings::WindowPlan;
pub use similarity::{Embedder, LazyEmbedder, SimilarityEvaluator, cosine_similarity};
