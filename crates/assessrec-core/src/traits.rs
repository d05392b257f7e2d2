/// Whether an embedding backend is asked to encode catalog text or a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    Document,
    Query,
}

/// A raw text encoder. Implementations return un-normalized (or normalized)
/// vectors of exactly `dim()` values; normalization and per-item failure
/// recovery are applied by the caller.
pub trait EmbeddingBackend: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn encode(&self, text: &str, mode: EmbedMode) -> anyhow::Result<Vec<f32>>;
}

/// Scores (query, text) pairs independently. Higher is more relevant.
pub trait PairwiseModel: Send + Sync {
    fn score_pairs(&self, query: &str, texts: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// A generative model that answers a prompt with free-form text.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}
