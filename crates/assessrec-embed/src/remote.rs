use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use assessrec_core::traits::{EmbedMode, EmbeddingBackend};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const GEMINI_EMBEDDING_DIM: usize = 768;

/// Embeddings from the Gemini `embedContent` endpoint.
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dim: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, model: Option<&str>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() { return Err(anyhow!("remote embeddings need an API key")); }
        let client = Client::builder().timeout(timeout).build().context("building HTTP client")?;
        let model = model.filter(|m| m.starts_with("models/")).unwrap_or(GEMINI_EMBEDDING_MODEL).to_string();
        Ok(Self { client, api_key, base_url: GEMINI_API_BASE.to_string(), model, dim: GEMINI_EMBEDDING_DIM })
    }

    /// The model requests are sent to; names without a `models/` prefix are
    /// replaced by [`GEMINI_EMBEDDING_MODEL`].
    pub fn model(&self) -> &str { &self.model }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl EmbeddingBackend for GeminiEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { 2048 }

    fn encode(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let task_type = match mode {
            EmbedMode::Document => "RETRIEVAL_DOCUMENT",
            EmbedMode::Query => "RETRIEVAL_QUERY",
        };
        let url = format!("{}/{}:embedContent", self.base_url, self.model);
        let body = EmbedRequest { model: &self.model, content: Content { parts: [Part { text }] }, task_type };
        let resp: EmbedResponse = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(resp.embedding.values)
    }
}
