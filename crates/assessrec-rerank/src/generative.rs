use once_cell::sync::Lazy;
use regex::Regex;

use assessrec_core::traits::TextGenerator;
use assessrec_core::types::{sort_desc_stable, CandidateMatch};

use crate::{RelevanceScorer, RerankOutcome, RerankResult};

/// Only the head of the retrieval list is sent to the model.
pub const MAX_SCORED_CANDIDATES: usize = 10;
pub const DESCRIPTION_PREVIEW_CHARS: usize = 150;

static SCORE_LIST: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[[\d.,\s]+\]").ok());

/// Rates the first [`MAX_SCORED_CANDIDATES`] candidates with one prompt and
/// reorders them by the normalized ratings. Candidates past the cutoff follow
/// in retrieval order with score 0.0.
pub struct GenerativeScorer {
    generator: Box<dyn TextGenerator>,
}

impl GenerativeScorer {
    pub fn new<G: TextGenerator + 'static>(generator: G) -> Self { Self { generator: Box::new(generator) } }
}

pub fn build_prompt(query: &str, candidates: &[CandidateMatch]) -> String {
    let listing = candidates
        .iter()
        .take(MAX_SCORED_CANDIDATES)
        .enumerate()
        .map(|(i, c)| {
            let preview: String = c.record.description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
            format!("{}. {}: {}", i + 1, c.record.name, preview)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given the job requirement: \"{query}\"\n\n\
         Rate each assessment's relevance on a scale of 1-10:\n\n\
         {listing}\n\n\
         Return only a JSON list of scores, e.g., [9, 7, 5, 8, 6, 4, 3, 2, 1, 1]"
    )
}

/// Pull the first bracketed number list out of `response`. Needs at least
/// `expected` numbers; extras are dropped.
pub fn parse_scores(response: &str, expected: usize) -> Result<Vec<f32>, String> {
    let m = SCORE_LIST.as_ref().and_then(|re| re.find(response)).ok_or_else(|| "no bracketed score list in response".to_string())?;
    let mut scores: Vec<f32> = serde_json::from_str(m.as_str()).map_err(|e| format!("unparseable score list {}: {e}", m.as_str()))?;
    if scores.len() < expected {
        return Err(format!("expected {expected} scores, got {}", scores.len()));
    }
    scores.truncate(expected);
    if scores.iter().any(|s| !s.is_finite()) { return Err("non-finite score".to_string()); }
    Ok(scores)
}

fn normalize_by_max(scores: &mut [f32]) {
    let max = scores.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for s in scores.iter_mut() { *s /= max; }
    }
}

impl RelevanceScorer for GenerativeScorer {
    fn rerank(&self, query: &str, candidates: Vec<CandidateMatch>) -> RerankResult {
        if candidates.is_empty() {
            return RerankResult { candidates, outcome: RerankOutcome::Skipped };
        }
        let scored_count = candidates.len().min(MAX_SCORED_CANDIDATES);
        let prompt = build_prompt(query, &candidates);
        let parsed = self
            .generator
            .generate(&prompt)
            .map_err(|e| format!("generator error: {e}"))
            .and_then(|text| parse_scores(&text, scored_count));
        let mut scores = match parsed {
            Ok(s) => s,
            Err(reason) => {
                tracing::warn!(%reason, "LLM reranking failed, using original order");
                return RerankResult::uniform(candidates, 1.0, RerankOutcome::FellBack(reason));
            }
        };
        normalize_by_max(&mut scores);

        let mut candidates = candidates;
        let tail = candidates.split_off(scored_count);
        let mut head: Vec<CandidateMatch> =
            candidates.into_iter().zip(scores).map(|(c, score)| CandidateMatch { score, ..c }).collect();
        sort_desc_stable(&mut head);
        head.extend(tail.into_iter().map(|c| CandidateMatch { score: 0.0, ..c }));
        tracing::debug!(scored = scored_count, total = head.len(), "LLM rerank");
        RerankResult { candidates: head, outcome: RerankOutcome::Scored }
    }

    fn name(&self) -> &'static str { "generative" }
}
