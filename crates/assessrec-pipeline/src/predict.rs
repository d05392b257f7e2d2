//! Batch predictions written as `query,assessment_url` CSV.

use anyhow::Context;
use serde::Deserialize;
use std::io::Write;
use std::path::Path;

use assessrec_core::error::{Error, Result};

use crate::RecommendationPipeline;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionQuery {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub query: String,
    pub assessment_url: String,
}

/// Accepts a JSON array of `{"query": ...}` objects or of plain strings.
pub fn load_prediction_queries(path: &Path) -> Result<Vec<PredictionQuery>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Text(String),
        Object(PredictionQuery),
    }
    let raw = std::fs::read_to_string(path).map_err(|_| Error::NotFound(format!("query file {}", path.display())))?;
    let entries: Vec<Entry> = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(entries
        .into_iter()
        .map(|e| match e {
            Entry::Text(query) => PredictionQuery { id: None, query },
            Entry::Object(q) => q,
        })
        .collect())
}

pub fn predict(pipeline: &RecommendationPipeline, queries: &[PredictionQuery], top_n: usize) -> Result<Vec<PredictionRow>> {
    let mut rows = Vec::new();
    for q in queries {
        let recs = pipeline.retrieve(&q.query, None, Some(top_n))?;
        tracing::info!(recommendations = recs.len(), "predicted");
        rows.extend(recs.into_iter().map(|r| PredictionRow { query: q.query.clone(), assessment_url: r.id }));
    }
    Ok(rows)
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) { format!("\"{}\"", s.replace('"', "\"\"")) } else { s.to_string() }
}

pub fn write_csv<W: Write>(mut out: W, rows: &[PredictionRow]) -> std::io::Result<()> {
    writeln!(out, "query,assessment_url")?;
    for row in rows {
        writeln!(out, "{},{}", csv_field(&row.query), csv_field(&row.assessment_url))?;
    }
    out.flush()
}
