use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use assessrec_core::traits::TextGenerator;
use assessrec_embed::remote::GEMINI_API_BASE;

/// Text generation through the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// `gemini-pro` -> `models/gemini-pro`.
fn qualified_model(name: &str) -> String {
    if name.starts_with("models/") { name.to_string() } else { format!("models/{name}") }
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: &str, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() { return Err(anyhow!("LLM reranking needs an API key")); }
        let client = Client::builder().timeout(timeout).build().context("building HTTP client")?;
        Ok(Self { client, api_key, base_url: GEMINI_API_BASE.to_string(), model: qualified_model(model) })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str { &self.model }
}

impl TextGenerator for GeminiGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest { contents: [RequestContent { parts: [RequestPart { text: prompt }] }] };
        let resp: GenerateResponse = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        let text: String = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() { return Err(anyhow!("empty response from {}", self.model)); }
        Ok(text)
    }
}
