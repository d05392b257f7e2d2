//! In-memory exact inner-product index over catalog embeddings.
//!
//! Built once from a catalog (or loaded from a bundle written by
//! [`VectorIndex::save`]), then read-only. Search is a brute-force scan; the
//! catalog is a few hundred records so no ANN structure is kept.

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use assessrec_core::catalog::ensure_unique_ids;
use assessrec_core::error::{Error, Result};
use assessrec_core::types::{AssessmentRecord, CandidateMatch, EmbedderSpec, EmbeddingVector};
use assessrec_embed::{EmbedStatus, EmbedderFactory, TextEmbedder};

pub mod bundle;
pub mod schema;

pub use bundle::{BundleManifest, FORMAT_VERSION};

/// Recreates the embedder a snapshot was built with. Called at most once per index.
pub type EmbedderLoader = Arc<dyn Fn(&EmbedderSpec) -> anyhow::Result<TextEmbedder> + Send + Sync>;

/// Records, their vectors and the identity of the embedder that produced them.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    records: Vec<AssessmentRecord>,
    vectors: Vec<EmbeddingVector>,
    spec: EmbedderSpec,
    built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    pub fn new(records: Vec<AssessmentRecord>, vectors: Vec<EmbeddingVector>, spec: EmbedderSpec, built_at: DateTime<Utc>) -> Result<Self> {
        if records.len() != vectors.len() {
            return Err(anyhow::anyhow!("{} records but {} vectors", records.len(), vectors.len()).into());
        }
        if let Some(bad) = vectors.iter().find(|v| v.dim() != spec.dim) {
            return Err(Error::DimensionMismatch { expected: spec.dim, actual: bad.dim() });
        }
        ensure_unique_ids(&records)?;
        Ok(Self { records, vectors, spec, built_at })
    }

    pub fn records(&self) -> &[AssessmentRecord] { &self.records }
    pub fn vectors(&self) -> &[EmbeddingVector] { &self.vectors }
    pub fn spec(&self) -> &EmbedderSpec { &self.spec }
    pub fn built_at(&self) -> DateTime<Utc> { self.built_at }
    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub ready: bool,
    pub total_assessments: usize,
    pub dim: usize,
    pub embedder: Option<EmbedderSpec>,
    pub embedder_loaded: bool,
    pub built_at: Option<DateTime<Utc>>,
}

pub struct VectorIndex {
    snapshot: Option<IndexSnapshot>,
    embedder: OnceCell<Arc<TextEmbedder>>,
    loader: EmbedderLoader,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("records", &self.snapshot.as_ref().map(IndexSnapshot::len))
            .field("embedder_loaded", &self.embedder.get().is_some())
            .finish()
    }
}

fn factory_loader(factory: EmbedderFactory) -> EmbedderLoader {
    Arc::new(move |spec: &EmbedderSpec| factory.create_for_spec(spec))
}

impl Default for VectorIndex {
    fn default() -> Self { Self::new() }
}

impl VectorIndex {
    /// An index with no snapshot; every search fails with `IndexNotBuilt`.
    pub fn new() -> Self {
        Self { snapshot: None, embedder: OnceCell::new(), loader: factory_loader(EmbedderFactory::default()) }
    }

    pub fn build(records: Vec<AssessmentRecord>, embedder: Arc<TextEmbedder>) -> Result<Self> {
        Self::build_with_progress(records, embedder, &ProgressBar::hidden())
    }

    /// Embed every record's composed text, keeping catalog order.
    pub fn build_with_progress(records: Vec<AssessmentRecord>, embedder: Arc<TextEmbedder>, pb: &ProgressBar) -> Result<Self> {
        ensure_unique_ids(&records)?;
        pb.set_length(records.len() as u64);
        let mut vectors = Vec::with_capacity(records.len());
        let mut fallbacks = 0usize;
        for rec in &records {
            let out = embedder.embed_with_status(&rec.embedding_text(), assessrec_core::traits::EmbedMode::Document);
            if out.status != EmbedStatus::Encoded { fallbacks += 1; }
            vectors.push(out.vector);
            pb.inc(1);
        }
        pb.finish_with_message("index built");
        if fallbacks > 0 { tracing::warn!(fallbacks, "some records were indexed with zero vectors"); }
        if records.is_empty() { tracing::warn!("building an index over an empty catalog"); }
        tracing::info!(records = records.len(), embedder = %embedder.spec().id(), "vector index built");

        let snapshot = IndexSnapshot::new(records, vectors, embedder.spec().clone(), Utc::now())?;
        let index = Self::from_snapshot(snapshot, factory_loader(EmbedderFactory::default()));
        // Fresh cell: set cannot fail.
        let _ = index.embedder.set(embedder);
        Ok(index)
    }

    pub fn from_snapshot(snapshot: IndexSnapshot, loader: EmbedderLoader) -> Self {
        Self { snapshot: Some(snapshot), embedder: OnceCell::new(), loader }
    }

    /// Use `embedder` for queries. Its spec must match the snapshot's.
    pub fn with_embedder(self, embedder: Arc<TextEmbedder>) -> Result<Self> {
        if let Some(snap) = &self.snapshot {
            if embedder.spec() != snap.spec() {
                return Err(Error::InvalidConfig(format!(
                    "index was built with {}, query embedder is {}",
                    snap.spec().id(),
                    embedder.spec().id()
                )));
            }
        }
        let cell = OnceCell::new();
        let _ = cell.set(embedder);
        Ok(Self { embedder: cell, ..self })
    }

    pub fn snapshot(&self) -> Option<&IndexSnapshot> { self.snapshot.as_ref() }

    pub fn is_ready(&self) -> bool { self.snapshot.is_some() }

    pub fn len(&self) -> usize { self.snapshot.as_ref().map_or(0, IndexSnapshot::len) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn require_snapshot(&self) -> Result<&IndexSnapshot> { self.snapshot.as_ref().ok_or(Error::IndexNotBuilt) }

    /// The query embedder, created on first use after a lazy load.
    pub fn embedder(&self) -> Result<&Arc<TextEmbedder>> {
        let snap = self.require_snapshot()?;
        let embedder = self.embedder.get_or_try_init(|| {
            tracing::info!(embedder = %snap.spec().id(), "loading query embedder");
            (self.loader)(snap.spec()).map(Arc::new)
        })?;
        Ok(embedder)
    }

    /// Top `top_k` records by inner product with the embedded query.
    ///
    /// If a lazily loaded embedder cannot be created the query gets no
    /// matches; creation is retried on the next query.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<CandidateMatch>> {
        let snap = self.require_snapshot()?;
        if top_k == 0 || snap.is_empty() { return Ok(Vec::new()); }
        let embedder = match self.embedder() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, embedder = %snap.spec().id(), "query embedder unavailable, returning no matches");
                return Ok(Vec::new());
            }
        };
        let q = embedder.embed_query(query);
        self.search_vector(&q, top_k)
    }

    pub fn search_vector(&self, query: &EmbeddingVector, top_k: usize) -> Result<Vec<CandidateMatch>> {
        let snap = self.require_snapshot()?;
        if query.dim() != snap.spec().dim {
            return Err(Error::DimensionMismatch { expected: snap.spec().dim, actual: query.dim() });
        }
        let mut scored: Vec<(usize, f32)> = snap.vectors().iter().map(|v| v.dot(query)).enumerate().collect();
        // sort_by is stable: equal scores stay in catalog order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        tracing::debug!(hits = scored.len(), top_k, "vector search");
        Ok(scored.into_iter().map(|(i, s)| CandidateMatch::new(snap.records()[i].clone(), s)).collect())
    }

    pub async fn save(&self, dir: &Path) -> Result<BundleManifest> {
        let snap = self.require_snapshot()?;
        bundle::write_bundle(dir, snap.records(), snap.vectors(), snap.spec(), snap.built_at()).await
    }

    /// Load with a default embedder factory (no API key, default model dirs).
    pub async fn load(dir: &Path, skip_model_load: bool) -> Result<Self> {
        Self::load_with_loader(dir, skip_model_load, factory_loader(EmbedderFactory::default())).await
    }

    pub async fn load_with_factory(dir: &Path, skip_model_load: bool, factory: EmbedderFactory) -> Result<Self> {
        Self::load_with_loader(dir, skip_model_load, factory_loader(factory)).await
    }

    /// Restore a bundle. With `skip_model_load` the embedder is created on the
    /// first query instead of here.
    pub async fn load_with_loader(dir: &Path, skip_model_load: bool, loader: EmbedderLoader) -> Result<Self> {
        let contents = bundle::read_bundle(dir).await?;
        let snapshot = IndexSnapshot::new(contents.records, contents.vectors, contents.manifest.embedder, contents.manifest.built_at)
            .map_err(|e| match e {
                Error::DimensionMismatch { expected, actual } => {
                    Error::PersistenceFormatMismatch(format!("stored vector dim {actual}, manifest says {expected}"))
                }
                other => other,
            })?;
        tracing::info!(dir = %dir.display(), records = snapshot.len(), embedder = %snapshot.spec().id(), "index bundle loaded");
        let index = Self::from_snapshot(snapshot, loader);
        if !skip_model_load { index.embedder()?; }
        Ok(index)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            ready: self.is_ready(),
            total_assessments: self.len(),
            dim: self.snapshot.as_ref().map_or(0, |s| s.spec().dim),
            embedder: self.snapshot.as_ref().map(|s| s.spec().clone()),
            embedder_loaded: self.embedder.get().is_some(),
            built_at: self.snapshot.as_ref().map(IndexSnapshot::built_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessrec_core::types::{CategoryCode, EmbedderBackend};

    fn rec(id: &str, name: &str, desc: &str) -> AssessmentRecord { AssessmentRecord::new(id, name, desc) }

    fn small_index() -> VectorIndex {
        let records = vec![
            rec("u1", "Java Programming", "Core Java collections and streams"),
            rec("u2", "Python Scripting", "Python data wrangling"),
            rec("u3", "Sales Personality", "Customer facing personality questionnaire").with_categories([CategoryCode::Behavioral]),
        ];
        VectorIndex::build(records, Arc::new(TextEmbedder::hashed(256))).unwrap()
    }

    #[test]
    fn unbuilt_index_is_not_ready() {
        let idx = VectorIndex::new();
        assert!(!idx.is_ready());
        assert!(matches!(idx.search("java", 5), Err(Error::IndexNotBuilt)));
    }

    #[test]
    fn search_is_sorted_and_bounded() {
        let idx = small_index();
        let hits = idx.search("java collections", 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].record.id, "u1");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| (-1.0001..=1.0001).contains(&h.score)));
    }

    #[test]
    fn zero_top_k_is_empty() {
        assert!(small_index().search("java", 0).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_catalog_order() {
        let idx = small_index();
        let zero = EmbeddingVector::zeros(256);
        let ids: Vec<_> = idx.search_vector(&zero, 3).unwrap().into_iter().map(|m| m.record.id).collect();
        assert_eq!(ids, ["u1", "u2", "u3"]);
    }

    #[test]
    fn wrong_query_dim_is_rejected() {
        let err = small_index().search_vector(&EmbeddingVector::zeros(8), 3).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 256, actual: 8 }));
    }

    #[test]
    fn duplicate_ids_fail_build() {
        let records = vec![rec("dup", "a", ""), rec("dup", "b", "")];
        let err = VectorIndex::build(records, Arc::new(TextEmbedder::hashed(16))).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(_)));
    }

    #[test]
    fn mismatched_query_embedder_is_rejected() {
        let err = small_index().with_embedder(Arc::new(TextEmbedder::hashed(32))).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    fn failing_loader() -> EmbedderLoader { Arc::new(|_: &EmbedderSpec| Err(anyhow::anyhow!("model weights missing"))) }

    #[test]
    fn nan_vectors_do_not_break_search() {
        let spec = TextEmbedder::hashed(2).spec().clone();
        let records = vec![rec("a", "a", ""), rec("b", "b", ""), rec("c", "c", "")];
        let vectors = vec![
            EmbeddingVector::from_normalized(vec![f32::NAN, 0.0]),
            EmbeddingVector::from_normalized(vec![1.0, 0.0]),
            EmbeddingVector::from_normalized(vec![0.0, 1.0]),
        ];
        let snap = IndexSnapshot::new(records, vectors, spec, Utc::now()).unwrap();
        let idx = VectorIndex::from_snapshot(snap, failing_loader());
        let hits = idx.search_vector(&EmbeddingVector::from_normalized(vec![1.0, 0.0]), 3).unwrap();
        assert_eq!(hits.len(), 3);
        let finite: Vec<_> = hits.iter().filter(|h| h.score.is_finite()).map(|h| h.record.id.as_str()).collect();
        assert_eq!(finite, ["b", "c"]);
    }

    #[test]
    fn unavailable_embedder_yields_no_matches() {
        let spec = TextEmbedder::hashed(4).spec().clone();
        let snap = IndexSnapshot::new(vec![rec("a", "a", "")], vec![EmbeddingVector::zeros(4)], spec, Utc::now()).unwrap();
        let idx = VectorIndex::from_snapshot(snap, failing_loader());
        assert!(idx.search("java", 5).unwrap().is_empty());
        assert!(!idx.stats().embedder_loaded);
        assert!(idx.embedder().is_err());
    }

    #[test]
    fn stats_report_embedder() {
        let stats = small_index().stats();
        assert!(stats.ready);
        assert_eq!(stats.total_assessments, 3);
        assert_eq!(stats.dim, 256);
        assert_eq!(stats.embedder.map(|s| s.backend), Some(EmbedderBackend::Hashed));
        assert!(stats.embedder_loaded);
    }
}
