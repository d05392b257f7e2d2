//! Query-time orchestration: retrieve, rerank, truncate, balance.

use serde::Serialize;
use std::sync::Arc;

use assessrec_core::config::{Settings, DEFAULT_TOP_K_RETRIEVAL, DEFAULT_TOP_N_FINAL};
use assessrec_core::error::{Error, Result};
use assessrec_core::types::{AssessmentRecord, CandidateMatch};
use assessrec_index::{IndexStats, VectorIndex};
use assessrec_rerank::{scorer_from_settings, PassThroughScorer, RelevanceScorer, RerankOutcome};

pub mod balance;
pub mod evaluate;
pub mod predict;

pub use balance::CategoryBalancer;

/// Final recommendations with the scores that ordered them.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub candidates: Vec<CandidateMatch>,
    pub outcome: RerankOutcome,
}

impl Recommendation {
    pub fn records(&self) -> Vec<AssessmentRecord> { self.candidates.iter().map(|c| c.record.clone()).collect() }

    pub fn into_records(self) -> Vec<AssessmentRecord> { self.candidates.into_iter().map(|c| c.record).collect() }

    pub fn scores(&self) -> Vec<f32> { self.candidates.iter().map(|c| c.score).collect() }
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub ready: bool,
    pub total_assessments: usize,
    /// False until the query embedder exists; a lazily loaded index creates it on first query.
    pub embedder_loaded: bool,
}

pub struct RecommendationPipeline {
    index: Arc<VectorIndex>,
    scorer: Box<dyn RelevanceScorer>,
    balancer: CategoryBalancer,
    top_k_retrieval: usize,
    top_n_final: usize,
}

impl RecommendationPipeline {
    pub fn new(index: Arc<VectorIndex>, scorer: Box<dyn RelevanceScorer>) -> Self {
        Self { index, scorer, balancer: CategoryBalancer, top_k_retrieval: DEFAULT_TOP_K_RETRIEVAL, top_n_final: DEFAULT_TOP_N_FINAL }
    }

    /// Pipeline without reranking.
    pub fn retrieval_only(index: Arc<VectorIndex>) -> Self { Self::new(index, Box::new(PassThroughScorer)) }

    /// Scorer and defaults taken from `settings`.
    pub fn from_settings(index: Arc<VectorIndex>, settings: &Settings) -> anyhow::Result<Self> {
        let scorer = scorer_from_settings(settings)?;
        Ok(Self::new(index, scorer).with_defaults(settings.retrieval.top_k_retrieval, settings.retrieval.top_n_final))
    }

    pub fn with_defaults(mut self, top_k_retrieval: usize, top_n_final: usize) -> Self {
        if top_k_retrieval > 0 { self.top_k_retrieval = top_k_retrieval; }
        if top_n_final > 0 { self.top_n_final = top_n_final; }
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> { &self.index }

    pub fn scorer_name(&self) -> &'static str { self.scorer.name() }

    pub fn is_ready(&self) -> bool { self.index.is_ready() }

    pub fn health(&self) -> Health {
        Health { ready: self.is_ready(), total_assessments: self.index.len(), embedder_loaded: self.index.stats().embedder_loaded }
    }

    pub fn stats(&self) -> IndexStats { self.index.stats() }

    /// Recommended records, best first after balancing.
    pub fn retrieve(&self, query: &str, top_k: Option<usize>, top_n: Option<usize>) -> Result<Vec<AssessmentRecord>> {
        Ok(self.retrieve_scored(query, top_k, top_n)?.into_records())
    }

    /// `None` or `0` for `top_k`/`top_n` means the configured default.
    pub fn retrieve_scored(&self, query: &str, top_k: Option<usize>, top_n: Option<usize>) -> Result<Recommendation> {
        if !self.is_ready() { return Err(Error::IndexNotBuilt); }
        if query.trim().is_empty() { return Err(Error::InvalidQuery("query is empty".to_string())); }
        let top_k = top_k.filter(|k| *k > 0).unwrap_or(self.top_k_retrieval);
        let top_n = top_n.filter(|n| *n > 0).unwrap_or(self.top_n_final);

        let preview: String = query.chars().take(100).collect();
        tracing::info!(top_k, top_n, query = %preview, "retrieving candidates");
        let candidates = self.index.search(query, top_k)?;
        if candidates.is_empty() {
            tracing::warn!("no candidates found");
            return Ok(Recommendation { candidates, outcome: RerankOutcome::Skipped });
        }

        let reranked = self.scorer.rerank(query, candidates);
        let mut ordered = reranked.candidates;
        ordered.truncate(top_n);
        let balanced = self.balancer.balance(ordered);
        tracing::info!(returned = balanced.len(), scorer = self.scorer.name(), "recommendations ready");
        Ok(Recommendation { candidates: balanced, outcome: reranked.outcome })
    }
}
