//! Text embedding for catalog records and queries.
//!
//! [`TextEmbedder`] wraps one [`EmbeddingBackend`] and owns the output
//! contract: every vector is L2-normalized, a degenerate input yields the zero
//! vector, and a backend failure for one text is replaced by the zero vector
//! (with a warning) instead of failing the batch.

use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

use assessrec_core::config::Settings;
use assessrec_core::traits::{EmbedMode, EmbeddingBackend};
use assessrec_core::types::{EmbedderBackend, EmbedderSpec, EmbeddingVector};

pub mod bert;
pub mod device;
pub mod hashed;
pub mod pool;
pub mod remote;
pub mod tokenize;
pub mod weights;

pub use bert::BertEmbedder;
pub use hashed::HashedEmbedder;
pub use pool::masked_mean_l2;
pub use remote::GeminiEmbedder;

/// How a single embedding was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedStatus {
    /// Backend succeeded and the vector has unit norm.
    Encoded,
    /// Backend succeeded but returned a zero-norm vector.
    Degenerate,
    /// Backend failed; the zero vector was substituted.
    ZeroFallback,
}

#[derive(Debug, Clone)]
pub struct Embedded {
    pub vector: EmbeddingVector,
    pub status: EmbedStatus,
}

pub struct TextEmbedder {
    backend: Box<dyn EmbeddingBackend>,
    spec: EmbedderSpec,
}

impl TextEmbedder {
    pub fn new(backend: Box<dyn EmbeddingBackend>, model_name: impl Into<String>, kind: EmbedderBackend) -> Self {
        let spec = EmbedderSpec { model_name: model_name.into(), backend: kind, dim: backend.dim() };
        Self { backend, spec }
    }

    /// Offline embedder used by tests and `APP_USE_FAKE_EMBEDDINGS=1`.
    pub fn hashed(dim: usize) -> Self {
        Self::new(Box::new(HashedEmbedder::new(dim)), hashed::HASHED_MODEL_NAME, EmbedderBackend::Hashed)
    }

    pub fn spec(&self) -> &EmbedderSpec { &self.spec }

    pub fn dim(&self) -> usize { self.spec.dim }

    pub fn max_len(&self) -> usize { self.backend.max_len() }

    /// Encode and normalize, surfacing backend errors.
    pub fn try_embed(&self, text: &str, mode: EmbedMode) -> Result<EmbeddingVector> {
        let raw = self.backend.encode(text, mode)?;
        if raw.len() != self.dim() {
            return Err(anyhow!("backend returned {} values, expected {}", raw.len(), self.dim()));
        }
        Ok(EmbeddingVector::normalized(raw))
    }

    pub fn embed_with_status(&self, text: &str, mode: EmbedMode) -> Embedded {
        match self.try_embed(text, mode) {
            Ok(vector) if vector.is_zero() => Embedded { vector, status: EmbedStatus::Degenerate },
            Ok(vector) => Embedded { vector, status: EmbedStatus::Encoded },
            Err(e) => {
                tracing::warn!(error = %e, embedder = %self.spec.id(), "embedding failed, using zero vector");
                Embedded { vector: EmbeddingVector::zeros(self.dim()), status: EmbedStatus::ZeroFallback }
            }
        }
    }

    pub fn embed(&self, text: &str) -> EmbeddingVector { self.embed_with_status(text, EmbedMode::Document).vector }

    pub fn embed_query(&self, text: &str) -> EmbeddingVector { self.embed_with_status(text, EmbedMode::Query).vector }

    pub fn embed_batch_with_status(&self, texts: &[String]) -> Vec<Embedded> {
        texts.iter().map(|t| self.embed_with_status(t, EmbedMode::Document)).collect()
    }

    /// Order-preserving; always returns `texts.len()` vectors.
    pub fn embed_batch(&self, texts: &[String]) -> Vec<EmbeddingVector> {
        self.embed_batch_with_status(texts).into_iter().map(|e| e.vector).collect()
    }
}

/// Everything needed to (re)create an embedder for a given [`EmbedderSpec`].
#[derive(Debug, Clone)]
pub struct EmbedderFactory {
    pub model_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for EmbedderFactory {
    fn default() -> Self { Self { model_dir: None, api_key: None, timeout: Duration::from_secs(30) } }
}

impl EmbedderFactory {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model_dir: settings.models.model_dir.as_deref().map(assessrec_core::config::expand_path),
            api_key: settings.api_key().map(str::to_string),
            timeout: Duration::from_secs(settings.llm.request_timeout_secs),
        }
    }

    pub fn create(&self, backend: EmbedderBackend, model_name: &str, hashed_dim: usize) -> Result<TextEmbedder> {
        let embedder = match backend {
            EmbedderBackend::Hashed => TextEmbedder::hashed(hashed_dim),
            EmbedderBackend::Bert => {
                let dir = weights::resolve_model_dir(self.model_dir.as_deref(), model_name)?;
                TextEmbedder::new(Box::new(BertEmbedder::load(&dir)?), model_name, EmbedderBackend::Bert)
            }
            EmbedderBackend::Remote => {
                let key = self.api_key.clone().ok_or_else(|| anyhow!("remote embeddings need llm.api_key / GEMINI_API_KEY"))?;
                let gemini = GeminiEmbedder::new(key, Some(model_name), self.timeout)?;
                let used = gemini.model().to_string();
                if used != model_name { tracing::warn!(configured = model_name, used = %used, "not a Gemini embedding model, using the default"); }
                TextEmbedder::new(Box::new(gemini), used, EmbedderBackend::Remote)
            }
        };
        Ok(embedder)
    }

    /// Recreate the embedder a bundle was built with; the dimension must match.
    pub fn create_for_spec(&self, spec: &EmbedderSpec) -> Result<TextEmbedder> {
        let embedder = self.create(spec.backend, &spec.model_name, spec.dim)?;
        if embedder.dim() != spec.dim {
            return Err(anyhow!("embedder {} has dim {}, bundle expects {}", embedder.spec().id(), embedder.dim(), spec.dim));
        }
        Ok(embedder)
    }
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Embedder described by `settings`, or the hashed one when
/// `APP_USE_FAKE_EMBEDDINGS` is set.
pub fn get_default_embedder(settings: &Settings) -> Result<TextEmbedder> {
    if use_fake_embeddings() {
        tracing::info!("using hashed embeddings (APP_USE_FAKE_EMBEDDINGS)");
        return Ok(TextEmbedder::hashed(hashed::DEFAULT_HASHED_DIM));
    }
    EmbedderFactory::from_settings(settings).create(
        settings.models.embedding_backend,
        &settings.models.embedding_model_name,
        hashed::DEFAULT_HASHED_DIM,
    )
}
