//! Recall@K over a labeled query set.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use assessrec_core::error::{Error, Result};

use crate::RecommendationPipeline;

/// Candidates retrieved per query during evaluation.
pub const EVAL_TOP_K: usize = 20;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LabeledQuery {
    pub query: String,
    #[serde(default, deserialize_with = "relevant_urls")]
    pub relevant_assessments: Vec<String>,
}

/// Entries are either `{"url": "..."}` objects or bare URL strings.
fn relevant_urls<'de, D>(d: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Url(String),
        Object { #[serde(default)] url: String },
    }
    let entries = Vec::<Entry>::deserialize(d)?;
    Ok(entries
        .into_iter()
        .map(|e| match e {
            Entry::Url(u) | Entry::Object { url: u } => u,
        })
        .filter(|u| !u.is_empty())
        .collect())
}

impl LabeledQuery {
    pub fn truth(&self) -> HashSet<&str> { self.relevant_assessments.iter().map(String::as_str).collect() }
}

pub fn load_labeled_queries(path: &Path) -> Result<Vec<LabeledQuery>> {
    let raw = std::fs::read_to_string(path).map_err(|_| Error::NotFound(format!("labeled queries {}", path.display())))?;
    let queries: Vec<LabeledQuery> = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(queries)
}

/// `|recommended ∩ truth| / |truth|`; 0.0 when there is no ground truth.
pub fn recall_at_k<'a>(recommended: impl IntoIterator<Item = &'a str>, truth: &HashSet<&str>) -> f64 {
    if truth.is_empty() { return 0.0; }
    let hits = recommended.into_iter().collect::<HashSet<_>>().intersection(truth).count();
    hits as f64 / truth.len() as f64
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRecall {
    pub query: String,
    pub recall: f64,
    pub truth_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub k: usize,
    pub mean_recall: f64,
    pub num_queries: usize,
    pub per_query: Vec<QueryRecall>,
}

impl EvaluationReport {
    pub fn individual_recalls(&self) -> Vec<f64> { self.per_query.iter().map(|q| q.recall).collect() }
}

pub fn evaluate(pipeline: &RecommendationPipeline, dataset: &[LabeledQuery], k: usize) -> Result<EvaluationReport> {
    tracing::info!(queries = dataset.len(), k, scorer = pipeline.scorer_name(), "evaluating");
    let mut per_query = Vec::with_capacity(dataset.len());
    for (i, item) in dataset.iter().enumerate() {
        let recs = pipeline.retrieve(&item.query, Some(EVAL_TOP_K), Some(k))?;
        let truth = item.truth();
        let recall = recall_at_k(recs.iter().map(|r| r.id.as_str()), &truth);
        tracing::info!(n = i + 1, recall, truth = truth.len(), "query evaluated");
        per_query.push(QueryRecall { query: item.query.clone(), recall, truth_count: truth.len() });
    }
    let mean_recall = if per_query.is_empty() { 0.0 } else { per_query.iter().map(|q| q.recall).sum::<f64>() / per_query.len() as f64 };
    Ok(EvaluationReport { k, mean_recall, num_queries: dataset.len(), per_query })
}

/// Baseline (no rerank) against a reranking pipeline over the same index.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub baseline: EvaluationReport,
    pub improved: EvaluationReport,
    /// Percent change of mean recall; 0.0 when the baseline is 0.
    pub improvement_percent: f64,
}

pub fn compare(baseline: EvaluationReport, improved: EvaluationReport) -> Comparison {
    let improvement_percent = if baseline.mean_recall > 0.0 {
        (improved.mean_recall - baseline.mean_recall) / baseline.mean_recall * 100.0
    } else {
        0.0
    };
    Comparison { baseline, improved, improvement_percent }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevant_entries_accept_objects_and_strings() {
        let json = r#"[{"query":"q","relevant_assessments":[{"url":"https://x/a"},"https://x/b",{"name":"no url"}]}]"#;
        let qs: Vec<LabeledQuery> = serde_json::from_str(json).unwrap();
        assert_eq!(qs[0].relevant_assessments, vec!["https://x/a", "https://x/b"]);
    }

    #[test]
    fn recall_counts_unique_hits() {
        let truth: HashSet<&str> = ["a", "b"].into_iter().collect();
        assert_eq!(recall_at_k(["a", "a", "c"], &truth), 0.5);
        assert_eq!(recall_at_k(["a", "b"], &truth), 1.0);
        assert_eq!(recall_at_k(["a"], &HashSet::new()), 0.0);
    }

    #[test]
    fn improvement_guards_zero_baseline() {
        let r = |m| EvaluationReport { k: 10, mean_recall: m, num_queries: 1, per_query: Vec::new() };
        assert_eq!(compare(r(0.0), r(0.5)).improvement_percent, 0.0);
        assert!((compare(r(0.4), r(0.5)).improvement_percent - 25.0).abs() < 1e-9);
    }
}
