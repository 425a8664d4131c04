//! Local sentence embeddings using candle + sentence-transformers.
//!
//! Text longer than the model's token window is split into overlapping
//! windows. Each window is embedded, and the mean of the window vectors
//! is re-normalized into one embedding for the whole text.

use crate::config::EmbeddingConfig;
use std::ops::Range;
use tracing::warn;

/// Tokens reserved for special tokens in each window.
const RESERVED_TOKENS: usize = 8;
const MIN_WINDOW: usize = 16;

/// Token window layout derived from [`EmbeddingConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub window: usize,
    pub overlap: usize,
}

impl WindowPlan {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let window = config
            .max_tokens
            .saturating_sub(RESERVED_TOKENS)
            .max(MIN_WINDOW);
        let overlap = config.chunk_overlap.min(window / 2);
        Self { window, overlap }
    }

    /// Shrink the window so `[CLS] + window + [SEP]` fits in the model's
    /// position embeddings.
    pub fn capped(self, max_positions: Option<usize>) -> Self {
        let Some(max_positions) = max_positions else {
            return self;
        };
        let limit = max_positions.saturating_sub(2).max(1);
        if self.window <= limit {
            return self;
        }

        warn!(
            configured = self.window,
            limit, "embedding window exceeds model positions, clamping"
        );
        Self {
            window: limit,
            overlap: self.overlap.min(limit / 2),
        }
    }

    /// Ranges of token positions covering `len` tokens.
    pub fn windows(&self, len: usize) -> Vec<Range<usize>> {
        if len == 0 {
            return Vec::new();
        }

        let step = (self.window - self.overlap).max(1);
        let mut ranges = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.window).min(len);
            ranges.push(start..end);
            if end == len {
                break;
            }
            start += step;
        }
        ranges
    }
}

#[cfg(feature = "embeddings")]
pub use local::LocalEmbedder;

#[cfg(feature = "embeddings")]
mod local {
    use super::WindowPlan;
    use crate::config::EmbeddingConfig;
    use crate::error::{BenchError, Result as BenchResult};
    use crate::eval::Embedder;
    use anyhow::{Context, Result};
    use candle_core::{Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
    use hf_hub::{Repo, RepoType, api::sync::Api};
    use tokenizers::Tokenizer;
    use tracing::debug;

    /// Turn off the tokenizer's own truncation and padding so long text
    /// reaches the window splitter whole.
    pub(super) fn prepare_tokenizer(tokenizer: &mut Tokenizer) -> Result<()> {
        tokenizer
            .with_truncation(None)
            .map_err(|e| anyhow::anyhow!("Failed to disable truncation: {}", e))?;
        tokenizer.with_padding(None);
        Ok(())
    }

    /// Content token ids of `text`, without special or padding tokens.
    pub(super) fn token_ids(tokenizer: &Tokenizer, text: &str) -> Result<Vec<u32>> {
        let encoding = tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        Ok(encoding
            .get_ids()
            .iter()
            .zip(encoding.get_attention_mask())
            .filter(|(_, mask)| **mask == 1)
            .map(|(id, _)| *id)
            .collect())
    }

    /// BERT-family sentence-transformer running on the CPU.
    pub struct LocalEmbedder {
        model_id: String,
        model: BertModel,
        tokenizer: Tokenizer,
        device: Device,
        plan: WindowPlan,
        batch_size: usize,
        cls_id: u32,
        sep_id: u32,
    }

    impl LocalEmbedder {
        /// Download (or reuse the cached copy of) a model from the Hugging Face Hub.
        pub fn load(config: &EmbeddingConfig) -> Result<Self> {
            let device = Device::Cpu;

            let api = Api::new().context("Failed to create HF Hub API")?;
            let repo = api.repo(Repo::new(config.model_id.clone(), RepoType::Model));

            let config_path = repo
                .get("config.json")
                .context("Failed to get config.json")?;
            let tokenizer_path = repo
                .get("tokenizer.json")
                .context("Failed to get tokenizer.json")?;
            let weights_path = repo
                .get("model.safetensors")
                .context("Failed to get model.safetensors")?;

            let raw_config = std::fs::read_to_string(&config_path)?;
            let bert_config: BertConfig =
                serde_json::from_str(&raw_config).context("Failed to parse config")?;
            let max_positions = serde_json::from_str::<serde_json::Value>(&raw_config)?
                .get("max_position_embeddings")
                .and_then(serde_json::Value::as_u64)
                .map(|n| n as usize);

            let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
            prepare_tokenizer(&mut tokenizer)?;

            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                    .context("Failed to load model weights")?
            };
            let model = BertModel::load(vb, &bert_config).context("Failed to load BERT model")?;

            let cls_id = tokenizer.token_to_id("[CLS]").unwrap_or(101);
            let sep_id = tokenizer.token_to_id("[SEP]").unwrap_or(102);

            Ok(Self {
                model_id: config.model_id.clone(),
                model,
                tokenizer,
                device,
                plan: WindowPlan::from_config(config).capped(max_positions),
                batch_size: config.batch_size.max(1),
                cls_id,
                sep_id,
            })
        }

        fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            let ids = token_ids(&self.tokenizer, text)?;
            if ids.is_empty() {
                anyhow::bail!("text produced no tokens");
            }

            let windows = self.plan.windows(ids.len());
            debug!(tokens = ids.len(), windows = windows.len(), "embedding text");

            let sequences: Vec<Vec<u32>> = windows
                .into_iter()
                .map(|range| {
                    let mut seq = Vec::with_capacity(range.len() + 2);
                    seq.push(self.cls_id);
                    seq.extend_from_slice(&ids[range]);
                    seq.push(self.sep_id);
                    seq
                })
                .collect();

            let mut vectors = Vec::with_capacity(sequences.len());
            for batch in sequences.chunks(self.batch_size) {
                vectors.extend(self.embed_batch(batch)?);
            }

            let dim = vectors.first().map(Vec::len).unwrap_or(0);
            let mut pooled = vec![0.0f32; dim];
            for v in &vectors {
                for (acc, x) in pooled.iter_mut().zip(v) {
                    *acc += x;
                }
            }
            normalize(&mut pooled);
            Ok(pooled)
        }

        /// Embed pre-tokenized sequences with masked mean pooling.
        fn embed_batch(&self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
            let batch_size = sequences.len();
            let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0);

            let mut input_ids_vec = Vec::with_capacity(batch_size * max_len);
            let mut attention_mask_vec = Vec::with_capacity(batch_size * max_len);
            for seq in sequences {
                input_ids_vec.extend(seq.iter().copied());
                input_ids_vec.extend(std::iter::repeat_n(0u32, max_len - seq.len()));
                attention_mask_vec.extend(std::iter::repeat_n(1u32, seq.len()));
                attention_mask_vec.extend(std::iter::repeat_n(0u32, max_len - seq.len()));
            }
            let token_type_ids_vec = vec![0u32; batch_size * max_len];

            let input_ids = Tensor::from_vec(input_ids_vec, (batch_size, max_len), &self.device)?;
            let attention_mask =
                Tensor::from_vec(attention_mask_vec, (batch_size, max_len), &self.device)?;
            let token_type_ids =
                Tensor::from_vec(token_type_ids_vec, (batch_size, max_len), &self.device)?;

            let output = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

            let mask = attention_mask
                .unsqueeze(2)?
                .to_dtype(output.dtype())?
                .broadcast_as(output.shape())?;
            let summed = (output * &mask)?.sum(1)?;
            let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
            let mean = (summed / counts)?;

            let mut rows = mean.to_vec2::<f32>()?;
            rows.iter_mut().for_each(|row| normalize(row));
            Ok(rows)
        }
    }

    fn normalize(v: &mut [f32]) {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
    }

    impl Embedder for LocalEmbedder {
        fn embed(&self, text: &str) -> BenchResult<Vec<f32>> {
            self.embed_text(text)
                .map_err(|e| BenchError::Embedding(format!("{:#}", e)))
        }

        fn name(&self) -> &str {
            &self.model_id
        }
    }
}
