//! Relevance scorers that reorder retrieval candidates.
//!
//! One [`RelevanceScorer`] trait, three strategies:
//! - [`PairwiseScorer`]: scores every (query, candidate) pair independently
//!   with a [`PairwiseModel`] (cross-encoder or lexical overlap)
//! - [`GenerativeScorer`]: asks a [`TextGenerator`] to rate the head of the list
//! - [`PassThroughScorer`]: keeps retrieval order
//!
//! Scorers never fail a query. Backend or parse problems are reported through
//! [`RerankOutcome::FellBack`] and the original order is returned.

use std::path::PathBuf;
use std::time::Duration;

use assessrec_core::config::{expand_path, RerankStrategy, Settings};
use assessrec_core::traits::PairwiseModel;
use assessrec_core::types::CandidateMatch;

pub mod cross_encoder;
pub mod gemini;
pub mod generative;
pub mod lexical;
pub mod pairwise;

pub use cross_encoder::CrossEncoderModel;
pub use gemini::GeminiGenerator;
pub use generative::GenerativeScorer;
pub use lexical::LexicalOverlapModel;
pub use pairwise::PairwiseScorer;

/// `models.reranker_model_name` value that selects the offline lexical model.
pub const LEXICAL_MODEL_NAME: &str = "lexical-overlap";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerankOutcome {
    /// Candidates were scored and reordered by the model.
    Scored,
    /// The model could not be used; original order with uniform scores.
    FellBack(String),
    /// Reranking is disabled or there was nothing to rerank.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RerankResult {
    pub candidates: Vec<CandidateMatch>,
    pub outcome: RerankOutcome,
}

impl RerankResult {
    pub fn scores(&self) -> Vec<f32> { self.candidates.iter().map(|c| c.score).collect() }

    pub fn fell_back(&self) -> bool { matches!(self.outcome, RerankOutcome::FellBack(_)) }

    /// Original order, every score set to `score`.
    pub(crate) fn uniform(candidates: Vec<CandidateMatch>, score: f32, outcome: RerankOutcome) -> Self {
        let candidates = candidates.into_iter().map(|c| CandidateMatch { score, ..c }).collect();
        Self { candidates, outcome }
    }
}

pub trait RelevanceScorer: Send + Sync {
    /// Reorder `candidates` for `query`. Returns the same candidates, permuted.
    fn rerank(&self, query: &str, candidates: Vec<CandidateMatch>) -> RerankResult;

    fn name(&self) -> &'static str;
}

/// Reranking disabled: retrieval order is final and every score is 1.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughScorer;

impl RelevanceScorer for PassThroughScorer {
    fn rerank(&self, _query: &str, candidates: Vec<CandidateMatch>) -> RerankResult {
        RerankResult::uniform(candidates, 1.0, RerankOutcome::Skipped)
    }

    fn name(&self) -> &'static str { "pass-through" }
}

fn pairwise_model(settings: &Settings) -> anyhow::Result<Box<dyn PairwiseModel>> {
    let name = settings.models.reranker_model_name.as_str();
    if name == LEXICAL_MODEL_NAME || std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
        tracing::info!("using lexical overlap reranker");
        return Ok(Box::new(LexicalOverlapModel));
    }
    let explicit: Option<PathBuf> = settings.models.reranker_model_dir.as_deref().map(expand_path);
    let dir = assessrec_embed::weights::resolve_model_dir(explicit.as_deref(), name)?;
    Ok(Box::new(CrossEncoderModel::new(dir)))
}

/// Build the scorer selected by `rerank.*` settings.
pub fn scorer_from_settings(settings: &Settings) -> anyhow::Result<Box<dyn RelevanceScorer>> {
    let scorer: Box<dyn RelevanceScorer> = match settings.rerank_strategy() {
        RerankStrategy::Disabled => Box::new(PassThroughScorer),
        RerankStrategy::Pairwise => Box::new(PairwiseScorer::new(pairwise_model(settings)?)),
        RerankStrategy::Generative => {
            let key = settings.api_key().ok_or_else(|| anyhow::anyhow!("LLM reranking needs an API key"))?;
            let timeout = Duration::from_secs(settings.llm.request_timeout_secs);
            let generator = GeminiGenerator::new(key, &settings.rerank.llm_model_name, timeout)?;
            tracing::info!(model = generator.model(), "generative reranking enabled");
            Box::new(GenerativeScorer::new(generator))
        }
    };
    tracing::info!(scorer = scorer.name(), "relevance scorer ready");
    Ok(scorer)
}
