//! llama.cpp engine
//!
//! Loads GGUF weights and runs sampled generation. Everything that touches
//! llama.cpp runs on the blocking pool. The vocabulary lives inside the GGUF
//! file, so one [`LoadedModel`] is both the model and its tokenizer.

use async_trait::async_trait;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::inference::{Backend, InferenceError, ModelSource};
use crate::storage::discovery::has_gguf_extension;
use crate::storage::huggingface;
use crate::types::config::SamplingParams;

/// A model resident in memory
pub struct LoadedModel {
    pub model: LlamaModel,
    pub path: PathBuf,
}

/// llama.cpp-backed [`Backend`]
pub struct LlamaEngine {
    backend: Arc<LlamaBackend>,
    gpu_layers: u32,
    context_size: u32,
    hub_cache: PathBuf,
    hub_aliases: HashMap<String, String>,
}

impl LlamaEngine {
    /// Initialise the native backend. Fails if llama.cpp cannot start, in
    /// which case the caller falls back to simulated inference.
    pub fn new(gpu_layers: u32, context_size: u32, hub_cache: PathBuf) -> Result<Self, InferenceError> {
        let backend = LlamaBackend::init()
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;
        tracing::info!(
            "llama.cpp backend ready (gpu_layers={}, context_size={})",
            gpu_layers,
            context_size
        );
        Ok(Self {
            backend: Arc::new(backend),
            gpu_layers,
            context_size,
            hub_cache,
            hub_aliases: huggingface::default_gguf_aliases(),
        })
    }

    /// Replace the identifier -> GGUF repository table used for hub loads.
    pub fn with_hub_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.hub_aliases = aliases;
        self
    }
}

#[async_trait]
impl Backend for LlamaEngine {
    type Model = LoadedModel;

    async fn load(&self, source: ModelSource) -> Result<LoadedModel, InferenceError> {
        let path = match source {
            ModelSource::Local(dir) => find_gguf(&dir)?,
            ModelSource::Hub(identifier) => {
                let repo = huggingface::gguf_repo_for(&identifier, &self.hub_aliases);
                if repo != identifier {
                    tracing::info!("Using GGUF conversion {} for {}", repo, identifier);
                }
                huggingface::resolve_model(repo, &self.hub_cache)
                    .await
                    .map_err(|e| InferenceError::Load(e.to_string()))?
            }
        };

        let backend = self.backend.clone();
        let gpu_layers = self.gpu_layers;

        tokio::task::spawn_blocking(move || {
            let params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
            let model = LlamaModel::load_from_file(&backend, &path, &params)
                .map_err(|e| InferenceError::Load(format!("{}: {}", path.display(), e)))?;
            tracing::info!("Model loaded from {}", path.display());
            Ok(LoadedModel { model, path })
        })
        .await
        .map_err(|e| InferenceError::Load(format!("Loading task failed: {}", e)))?
    }

    async fn generate(
        &self,
        model: Arc<LoadedModel>,
        prompt: String,
        params: SamplingParams,
    ) -> Result<String, InferenceError> {
        let backend = self.backend.clone();
        let context_size = self.context_size;

        tokio::task::spawn_blocking(move || {
            run_generation(&backend, &model.model, &prompt, params, context_size)
        })
        .await
        .map_err(|e| InferenceError::Generation(format!("Generation task failed: {}", e)))?
    }
}

/// Locate the weights file for a local model folder: the folder itself if it
/// is a `.gguf` file, otherwise the first `.gguf` inside it by name.
pub fn find_gguf(path: &Path) -> Result<PathBuf, InferenceError> {
    if path.is_file() && has_gguf_extension(path) {
        return Ok(path.to_path_buf());
    }

    let entries = std::fs::read_dir(path)
        .map_err(|e| InferenceError::Load(format!("{}: {}", path.display(), e)))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_gguf_extension(p))
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        InferenceError::Load(format!(
            "No GGUF weights in {}; convert the checkpoint to GGUF to serve it locally",
            path.display()
        ))
    })
}

fn generation_error(stage: &str, e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Generation(format!("{} failed: {}", stage, e))
}

fn run_generation(
    backend: &LlamaBackend,
    model: &LlamaModel,
    prompt: &str,
    params: SamplingParams,
    context_size: u32,
) -> Result<String, InferenceError> {
    let tokens = model
        .str_to_token(prompt, AddBos::Always)
        .map_err(|e| generation_error("Tokenization", e))?;
    if tokens.is_empty() {
        return Err(InferenceError::Generation("Prompt produced no tokens".to_string()));
    }

    let n_ctx = context_size.min(model.n_ctx_train()).max(1);
    if tokens.len() as u32 >= n_ctx {
        return Err(InferenceError::Generation(format!(
            "Prompt ({} tokens) does not fit the {} token context",
            tokens.len(),
            n_ctx
        )));
    }
    let max_new = params.max_tokens.min(n_ctx - tokens.len() as u32);

    let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(n_ctx));
    let mut ctx = model
        .new_context(backend, ctx_params)
        .map_err(|e| generation_error("Context creation", e))?;

    // Prefill in n_batch sized chunks; only the final prompt token needs logits
    let n_batch = (ctx.n_batch() as usize).max(1);
    let mut batch = LlamaBatch::new(n_batch, 1);
    let last_index = tokens.len() - 1;
    for (chunk_index, chunk) in tokens.chunks(n_batch).enumerate() {
        batch.clear();
        for (offset, &token) in chunk.iter().enumerate() {
            let pos = chunk_index * n_batch + offset;
            batch
                .add(token, pos as i32, &[0], pos == last_index)
                .map_err(|e| generation_error("Batch", e))?;
        }
        ctx.decode(&mut batch)
            .map_err(|e| generation_error("Prefill decode", e))?;
    }

    let mut sampler = build_sampler(&params);
    let mut decoder = encoding_rs::UTF_8.new_decoder();
    let mut output = String::new();
    let mut n_cur = tokens.len() as i32;

    for _ in 0..max_new {
        let token = sampler.sample(&ctx, batch.n_tokens() - 1);
        sampler.accept(token);

        if model.is_eog_token(token) {
            break;
        }

        let piece = model
            .token_to_piece(token, &mut decoder, false, None)
            .map_err(|e| generation_error("Token decode", e))?;
        output.push_str(&piece);

        batch.clear();
        batch
            .add(token, n_cur, &[0], true)
            .map_err(|e| generation_error("Batch", e))?;
        n_cur += 1;
        ctx.decode(&mut batch)
            .map_err(|e| generation_error("Decode", e))?;
    }

    Ok(output)
}

fn build_sampler(params: &SamplingParams) -> LlamaSampler {
    if params.temperature <= 0.0 {
        return LlamaSampler::greedy();
    }

    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    LlamaSampler::chain_simple([
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(seed),
    ])
}
