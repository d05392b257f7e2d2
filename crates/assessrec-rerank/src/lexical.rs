use anyhow::Result;

use assessrec_core::traits::PairwiseModel;

/// Fraction of query terms contained in the candidate text. Model-free, used
/// offline and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalOverlapModel;

impl LexicalOverlapModel {
    pub fn score(query: &str, text: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let words: Vec<&str> = query_lower.split_whitespace().collect();
        if words.is_empty() { return 0.0; }
        let text_lower = text.to_lowercase();
        let hits = words.iter().filter(|w| text_lower.contains(*w)).count();
        hits as f32 / words.len() as f32
    }
}

impl PairwiseModel for LexicalOverlapModel {
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        Ok(texts.iter().map(|t| Self::score(query, t)).collect())
    }
}
