use anyhow::Context;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::AssessmentRecord;

/// Read a catalog JSON array from disk.
pub fn load_catalog(path: &Path) -> Result<Vec<AssessmentRecord>> {
    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("catalog file {}", path.display())))
        }
        Err(e) => return Err(anyhow::Error::new(e).context(format!("reading {}", path.display())).into()),
    };
    let records = parse_catalog(&raw)?;
    tracing::info!(path = %path.display(), records = records.len(), "loaded catalog");
    Ok(records)
}

/// Parse catalog JSON, tidy text fields and apply the category default.
pub fn parse_catalog(json: &str) -> Result<Vec<AssessmentRecord>> {
    let mut records: Vec<AssessmentRecord> = serde_json::from_str(json).context("catalog is not a JSON array of assessments")?;
    for rec in &mut records {
        rec.name = clean_text(&rec.name);
        rec.description = clean_text(&rec.description);
        rec.normalize_categories();
    }
    ensure_unique_ids(&records)?;
    Ok(records)
}

pub fn ensure_unique_ids(records: &[AssessmentRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for rec in records {
        if !seen.insert(rec.id.as_str()) { return Err(Error::DuplicateId(rec.id.clone())); }
    }
    Ok(())
}

/// Collapse runs of whitespace and trim.
pub fn clean_text(text: &str) -> String { text.split_whitespace().collect::<Vec<_>>().join(" ") }
