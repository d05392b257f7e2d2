use anyhow::{Result, anyhow};
use candle_core::Device;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;

use assessrec_core::traits::{EmbedMode, EmbeddingBackend};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;
use crate::weights::{load_var_builder, read_model_config, ModelDims};

/// Sentence-transformers style encoder: BERT + masked mean pooling + L2.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
}

impl BertEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading sentence encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let raw_config = read_model_config(model_dir)?;
        let config: BertConfig = serde_json::from_str(&raw_config)?;
        let dims: ModelDims = serde_json::from_str(&raw_config)?;
        let vb = load_var_builder(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        tracing::info!(dim = dims.hidden_size, "sentence encoder loaded");
        Ok(Self { model, tokenizer, device, dim: dims.hidden_size, max_len: dims.max_position_embeddings.min(256) })
    }
}

impl EmbeddingBackend for BertEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { self.max_len }

    fn encode(&self, text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        let start = Instant::now();
        let inputs = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let hidden = self.model.forward(&inputs.input_ids, &inputs.token_type_ids, Some(&inputs.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &inputs.attention_mask)?;
        let mut rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        let emb = rows.pop().ok_or_else(|| anyhow!("encoder returned an empty batch"))?;
        if start.elapsed().as_millis() > 100 { tracing::debug!(ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(emb)
    }
}
