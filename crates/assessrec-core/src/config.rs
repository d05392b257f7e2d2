//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `GEMINI_API_KEY`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_RETRIEVAL__TOP_K_RETRIEVAL=30`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::types::EmbedderBackend;

pub const DEFAULT_TOP_K_RETRIEVAL: usize = 20;
pub const DEFAULT_TOP_N_FINAL: usize = 10;
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_RERANKER_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";
pub const DEFAULT_LLM_MODEL: &str = "gemini-pro";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment
            .merge(Env::raw().only(&["GEMINI_API_KEY"]).map(|_| "llm.api_key".into()))
            .merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of every recognized knob, defaults filled in.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        match env {
            "prod" | "production" => {
                let backend: Option<EmbedderBackend> = self.get("models.embedding_backend").ok();
                if backend == Some(EmbedderBackend::Hashed) {
                    anyhow::bail!("hashed embeddings are a test backend and cannot be used in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

/// All recognized configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub models: ModelSettings,
    pub rerank: RerankSettings,
    pub llm: LlmSettings,
    pub data: DataSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Candidates fetched from the vector index before reranking.
    pub top_k_retrieval: usize,
    /// Maximum number of recommendations returned.
    pub top_n_final: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k_retrieval: DEFAULT_TOP_K_RETRIEVAL, top_n_final: DEFAULT_TOP_N_FINAL } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub embedding_model_name: String,
    pub embedding_backend: EmbedderBackend,
    /// Local directory holding `config.json`, `tokenizer.json` and weights.
    pub model_dir: Option<String>,
    pub reranker_model_name: String,
    pub reranker_model_dir: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            embedding_model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_backend: EmbedderBackend::Bert,
            model_dir: None,
            reranker_model_name: DEFAULT_RERANKER_MODEL.to_string(),
            reranker_model_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub use_reranker: bool,
    pub use_llm_reranking: bool,
    pub llm_model_name: String,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self { use_reranker: true, use_llm_reranking: false, llm_model_name: DEFAULT_LLM_MODEL.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self { Self { api_key: None, request_timeout_secs: 30 } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub catalog_path: String,
    pub index_dir: String,
    pub train_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            catalog_path: "data/catalog.json".to_string(),
            index_dir: "data/index".to_string(),
            train_path: "data/train.json".to_string(),
        }
    }
}

/// Which relevance scorer the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankStrategy {
    Disabled,
    Pairwise,
    Generative,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retrieval.top_k_retrieval == 0 { anyhow::bail!("retrieval.top_k_retrieval must be > 0"); }
        if self.retrieval.top_n_final == 0 { anyhow::bail!("retrieval.top_n_final must be > 0"); }
        if self.llm.request_timeout_secs == 0 { anyhow::bail!("llm.request_timeout_secs must be > 0"); }
        Ok(())
    }

    pub fn api_key(&self) -> Option<&str> { self.llm.api_key.as_deref().filter(|k| !k.trim().is_empty()) }

    /// LLM reranking needs a credential; without one it is quietly off.
    pub fn effective_use_llm_reranking(&self) -> bool { self.rerank.use_llm_reranking && self.api_key().is_some() }

    pub fn rerank_strategy(&self) -> RerankStrategy {
        if self.effective_use_llm_reranking() {
            RerankStrategy::Generative
        } else if self.rerank.use_reranker {
            RerankStrategy::Pairwise
        } else {
            RerankStrategy::Disabled
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
