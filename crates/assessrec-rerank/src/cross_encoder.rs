use anyhow::{Result, anyhow};
use candle_core::{Device, IndexOp};
use candle_nn::{linear, Linear, Module};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use assessrec_core::traits::PairwiseModel;
use assessrec_embed::device::select_device;
use assessrec_embed::tokenize::tokenize_on_device;
use assessrec_embed::weights::{load_var_builder, read_model_config, ModelDims};

/// Max tokens for a (query, passage) pair.
pub const PAIR_MAX_LEN: usize = 512;

/// `BertForSequenceClassification` with a single logit, e.g.
/// `cross-encoder/ms-marco-MiniLM-L-6-v2`. Weights are loaded on the first
/// call to [`PairwiseModel::score_pairs`].
pub struct CrossEncoderModel {
    model_dir: PathBuf,
    loaded: OnceCell<LoadedCrossEncoder>,
}

struct LoadedCrossEncoder {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
}

impl CrossEncoderModel {
    pub fn new(model_dir: PathBuf) -> Self { Self { model_dir, loaded: OnceCell::new() } }

    pub fn is_loaded(&self) -> bool { self.loaded.get().is_some() }

    fn get(&self) -> Result<&LoadedCrossEncoder> { self.loaded.get_or_try_init(|| LoadedCrossEncoder::load(&self.model_dir)) }
}

impl LoadedCrossEncoder {
    fn load(dir: &Path) -> Result<Self> {
        tracing::info!(dir = %dir.display(), "loading cross-encoder");
        let device = select_device();
        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let raw_config = read_model_config(dir)?;
        let config: BertConfig = serde_json::from_str(&raw_config)?;
        let dims: ModelDims = serde_json::from_str(&raw_config)?;
        let vb = load_var_builder(dir, &device)?;
        let bert = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = linear(dims.hidden_size, dims.hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(dims.hidden_size, 1, vb.pp("classifier"))?;
        Ok(Self { bert, pooler, classifier, tokenizer, device, max_len: dims.max_position_embeddings.min(PAIR_MAX_LEN) })
    }

    /// Relevance probability (sigmoid of the single logit).
    fn score(&self, query: &str, text: &str) -> Result<f32> {
        let inputs = tokenize_on_device(&self.tokenizer, (query, text), self.max_len, &self.device)?;
        let hidden = self.bert.forward(&inputs.input_ids, &inputs.token_type_ids, Some(&inputs.attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;
        let logit = logits.flatten_all()?.to_device(&Device::Cpu)?.to_vec1::<f32>()?
            .first()
            .copied()
            .ok_or_else(|| anyhow!("classifier returned no logit"))?;
        Ok(1.0 / (1.0 + (-logit).exp()))
    }
}

impl PairwiseModel for CrossEncoderModel {
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let model = self.get()?;
        texts.iter().map(|t| model.score(query, t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_weights_surface_as_error_not_panic() {
        let tmp = std::env::temp_dir().join("assessrec-no-such-cross-encoder");
        let model = CrossEncoderModel::new(tmp);
        assert!(model.score_pairs("q", &["t".to_string()]).is_err());
        assert!(!model.is_loaded());
    }
}
