use anyhow::{Result, anyhow};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fields of a HF `config.json` needed outside the transformer itself.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDims {
    pub hidden_size: usize,
    #[serde(default = "default_max_positions")]
    pub max_position_embeddings: usize,
}

fn default_max_positions() -> usize { 512 }

pub fn read_model_config(model_dir: &Path) -> Result<String> {
    let config_path = model_dir.join("config.json");
    std::fs::read_to_string(&config_path).map_err(|e| anyhow!("Failed to read {}: {}", config_path.display(), e))
}

/// Prefer `model.safetensors`; fall back to a pickled `pytorch_model.bin`.
pub fn load_var_builder(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        tracing::debug!(path = %safetensors.display(), "loading safetensors weights");
        // SAFETY: the weights file is treated as read-only for the life of the process.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    if !weights_path.exists() {
        return Err(anyhow!("No model.safetensors or pytorch_model.bin in {}", model_dir.display()));
    }
    tracing::debug!(path = %weights_path.display(), "loading pickled weights");
    let weights = candle_core::pickle::read_all(&weights_path)?;
    let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

/// Find a local copy of `model_name`.
///
/// Lookup order: the explicit directory, `APP_MODEL_DIR`/`MODEL_DIR`
/// (joined with the model's short name when that subdirectory exists), then
/// `models/<short name>` and `../models/<short name>`.
pub fn resolve_model_dir(explicit: Option<&Path>, model_name: &str) -> Result<PathBuf> {
    if let Some(p) = explicit {
        if p.exists() { return Ok(p.to_path_buf()); }
        return Err(anyhow!("Model directory {} does not exist", p.display()));
    }
    let short = model_name.rsplit('/').next().unwrap_or(model_name);
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let base = PathBuf::from(&dir);
            let nested = base.join(short);
            if nested.exists() { tracing::info!(dir = %nested.display(), "using {}", var); return Ok(nested); }
            if base.join("config.json").exists() { tracing::info!(dir = %base.display(), "using {}", var); return Ok(base); }
        }
    }
    for root in ["models", "../models"] {
        let p = Path::new(root).join(short);
        if p.exists() { tracing::info!(dir = %p.display(), "using model dir"); return Ok(p); }
    }
    Err(anyhow!("Could not locate a local copy of model '{}'", model_name))
}
