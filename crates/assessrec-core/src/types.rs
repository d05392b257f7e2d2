//! Domain types shared by the embedder, index, rerank and pipeline crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type RecordId = String;

/// Assessment category codes as they appear in the catalog (`test_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoryCode {
    /// Knowledge / cognitive ability.
    #[serde(rename = "K")]
    Knowledge,
    /// Performance / skill.
    #[serde(rename = "P")]
    Performance,
    /// Situational judgment.
    #[serde(rename = "S")]
    Situational,
    /// Behavioral / personality.
    #[serde(rename = "B")]
    Behavioral,
}

impl CategoryCode {
    pub fn code(self) -> &'static str {
        match self {
            Self::Knowledge => "K",
            Self::Performance => "P",
            Self::Situational => "S",
            Self::Behavioral => "B",
        }
    }

    pub fn is_technical(self) -> bool { matches!(self, Self::Knowledge | Self::Performance) }

    pub fn is_behavioral(self) -> bool { matches!(self, Self::Situational | Self::Behavioral) }
}

impl fmt::Display for CategoryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

impl FromStr for CategoryCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "K" => Ok(Self::Knowledge),
            "P" => Ok(Self::Performance),
            "S" => Ok(Self::Situational),
            "B" => Ok(Self::Behavioral),
            other => Err(format!("unknown category code '{other}'")),
        }
    }
}

/// Yes / no / unknown flag used for adaptive and remote support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum TriState {
    Yes,
    No,
    #[default]
    Unknown,
}

impl From<Option<String>> for TriState {
    fn from(v: Option<String>) -> Self { v.as_deref().map(Self::parse_lenient).unwrap_or_default() }
}

impl From<TriState> for String {
    fn from(v: TriState) -> Self { v.as_str().to_string() }
}

impl TriState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse; anything that is not clearly yes/no is unknown.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" => Self::Yes,
            "no" | "n" | "false" => Self::No,
            _ => Self::Unknown,
        }
    }
}

/// One catalog entry. Immutable once loaded.
///
/// Field names follow the catalog JSON (`url`, `test_type`, `duration`,
/// `adaptive_support`, `remote_support`) so catalogs and index bundles share
/// one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    /// Stable unique identifier; the product URL.
    #[serde(rename = "url")]
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "test_type", default, deserialize_with = "known_codes")]
    pub category_codes: Vec<CategoryCode>,
    #[serde(rename = "duration", default)]
    pub duration_minutes: Option<u32>,
    #[serde(rename = "adaptive_support", default)]
    pub adaptive: TriState,
    #[serde(rename = "remote_support", default)]
    pub remote: TriState,
}

/// Unknown `test_type` letters are dropped with a warning; an entry left with
/// no codes gets the Knowledge default in [`AssessmentRecord::normalize_categories`].
fn known_codes<'de, D>(d: D) -> Result<Vec<CategoryCode>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<String>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .iter()
        .filter_map(|s| match s.parse::<CategoryCode>() {
            Ok(code) => Some(code),
            Err(e) => {
                tracing::warn!(code = %s, "{e}, skipping");
                None
            }
        })
        .collect())
}

impl AssessmentRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category_codes: vec![CategoryCode::Knowledge],
            duration_minutes: None,
            adaptive: TriState::Unknown,
            remote: TriState::Unknown,
        }
    }

    pub fn with_categories(mut self, codes: impl IntoIterator<Item = CategoryCode>) -> Self {
        self.category_codes = codes.into_iter().collect();
        self.normalize_categories();
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    /// Deduplicate codes and apply the Knowledge default for an empty set.
    pub fn normalize_categories(&mut self) {
        let mut seen = Vec::with_capacity(self.category_codes.len());
        for code in self.category_codes.drain(..) {
            if !seen.contains(&code) { seen.push(code); }
        }
        if seen.is_empty() { seen.push(CategoryCode::Knowledge); }
        self.category_codes = seen;
    }

    pub fn has_technical(&self) -> bool { self.category_codes.iter().any(|c| c.is_technical()) }

    pub fn has_behavioral(&self) -> bool { self.category_codes.iter().any(|c| c.is_behavioral()) }

    /// Codes as the comma separated string used in bundles (`"K,P"`).
    pub fn codes_joined(&self, sep: &str) -> String {
        self.category_codes.iter().map(|c| c.code()).collect::<Vec<_>>().join(sep)
    }

    /// Text fed to the embedder at index build time.
    ///
    /// `Assessment: {name} | Type: {codes} | Description: {description}`,
    /// followed by `Duration` when positive, then `Adaptive` and `Remote`
    /// (`yes`, `no` or `unknown`).
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            format!("Assessment: {}", self.name),
            format!("Type: {}", self.codes_joined(", ")),
            format!("Description: {}", self.description),
        ];
        if let Some(d) = self.duration_minutes.filter(|d| *d > 0) { parts.push(format!("Duration: {d} minutes")); }
        parts.push(format!("Adaptive: {}", self.adaptive.as_str()));
        parts.push(format!("Remote: {}", self.remote.as_str()));
        parts.join(" | ")
    }

    /// Text scored against the query by pairwise rerankers.
    pub fn rerank_text(&self) -> String { format!("{}. {}", self.name, self.description) }
}

/// An L2-normalized embedding, or the zero vector on fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Normalize `raw` to unit length. A zero (or non-finite) norm yields the
    /// zero vector of the same dimension.
    pub fn normalized(raw: Vec<f32>) -> Self {
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Self::zeros(raw.len());
        }
        Self(raw.into_iter().map(|x| x / norm).collect())
    }

    pub fn zeros(dim: usize) -> Self { Self(vec![0.0; dim]) }

    /// Wrap values that are already unit length (e.g. read back from a bundle).
    pub fn from_normalized(values: Vec<f32>) -> Self { Self(values) }

    pub fn dim(&self) -> usize { self.0.len() }

    pub fn as_slice(&self) -> &[f32] { &self.0 }

    pub fn into_inner(self) -> Vec<f32> { self.0 }

    pub fn norm(&self) -> f32 { self.0.iter().map(|x| x * x).sum::<f32>().sqrt() }

    pub fn is_zero(&self) -> bool { self.0.iter().all(|x| *x == 0.0) }

    /// Inner product. Equals cosine similarity for unit vectors.
    pub fn dot(&self, other: &EmbeddingVector) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }
}

/// Which family of encoder produced a set of embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// Local candle sentence encoder.
    #[default]
    Bert,
    /// Deterministic token-hash encoder; offline and test use.
    Hashed,
    /// Remote embedding API.
    Remote,
}

/// Identity of an embedder. Stored in every index bundle so a loaded index is
/// only ever queried with vectors from the same space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderSpec {
    pub model_name: String,
    pub backend: EmbedderBackend,
    pub dim: usize,
}

impl EmbedderSpec {
    pub fn id(&self) -> String {
        let backend = match self.backend {
            EmbedderBackend::Bert => "bert",
            EmbedderBackend::Hashed => "hashed",
            EmbedderBackend::Remote => "remote",
        };
        format!("{}:{}:d{}", backend, self.model_name, self.dim)
    }
}

/// A record scored for one query. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub record: AssessmentRecord,
    pub score: f32,
}

impl CandidateMatch {
    pub fn new(record: AssessmentRecord, score: f32) -> Self { Self { record, score } }
}

/// Stable descending sort by score; equal scores keep their input order.
pub fn sort_desc_stable(matches: &mut [CandidateMatch]) {
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
}
