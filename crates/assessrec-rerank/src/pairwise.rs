use assessrec_core::traits::PairwiseModel;
use assessrec_core::types::{sort_desc_stable, CandidateMatch};

use crate::{RelevanceScorer, RerankOutcome, RerankResult};

/// Scores each candidate's `"{name}. {description}"` against the query and
/// sorts by that score.
pub struct PairwiseScorer {
    model: Box<dyn PairwiseModel>,
}

impl PairwiseScorer {
    pub fn new(model: Box<dyn PairwiseModel>) -> Self { Self { model } }

    pub fn with_model<M: PairwiseModel + 'static>(model: M) -> Self { Self::new(Box::new(model)) }
}

impl RelevanceScorer for PairwiseScorer {
    fn rerank(&self, query: &str, candidates: Vec<CandidateMatch>) -> RerankResult {
        if candidates.is_empty() {
            return RerankResult { candidates, outcome: RerankOutcome::Skipped };
        }
        let texts: Vec<String> = candidates.iter().map(|c| c.record.rerank_text()).collect();
        let scores = match self.model.score_pairs(query, &texts) {
            Ok(s) if s.len() == candidates.len() && s.iter().all(|x| x.is_finite()) => s,
            Ok(s) if s.len() == candidates.len() => {
                let reason = format!("model returned {} non-finite scores", s.iter().filter(|x| !x.is_finite()).count());
                tracing::warn!(%reason, "pairwise rerank failed, keeping retrieval order");
                return RerankResult::uniform(candidates, 1.0, RerankOutcome::FellBack(reason));
            }
            Ok(s) => {
                let reason = format!("model returned {} scores for {} candidates", s.len(), candidates.len());
                tracing::warn!(%reason, "pairwise rerank failed, keeping retrieval order");
                return RerankResult::uniform(candidates, 1.0, RerankOutcome::FellBack(reason));
            }
            Err(e) => {
                tracing::warn!(error = %e, "pairwise rerank failed, keeping retrieval order");
                return RerankResult::uniform(candidates, 1.0, RerankOutcome::FellBack(e.to_string()));
            }
        };
        let mut reranked: Vec<CandidateMatch> =
            candidates.into_iter().zip(scores).map(|(c, score)| CandidateMatch { score, ..c }).collect();
        sort_desc_stable(&mut reranked);
        tracing::debug!(candidates = reranked.len(), "pairwise rerank");
        RerankResult { candidates: reranked, outcome: RerankOutcome::Scored }
    }

    fn name(&self) -> &'static str { "pairwise" }
}
