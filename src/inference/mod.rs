//! LLM inference
//!
//! The [`Inference`] capability is what request handlers talk to. The
//! production implementation is [`LocalInference`] over the llama.cpp
//! [`engine`]; [`simulated::SimulatedInference`] stands in when the native
//! backend cannot be initialised. The choice is made once at start-up.

pub mod cache;
pub mod engine;
pub mod simulated;

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::inference::cache::ModelCache;
use crate::types::config::SamplingParams;

/// Inference errors
///
/// `Load` and `Unavailable` mean the model never became resident; handlers
/// report them as server errors. `Generation` happens with a resident model
/// and is reported inside a successful reply.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Inference backend unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Generation(String),
}

/// Where a model's weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A folder under the models directory
    Local(PathBuf),
    /// An external hub identifier
    Hub(String),
}

/// Local folder if `name` is a single path component naming an entry under
/// `models_dir`, external identifier otherwise. Names that would climb out of
/// the models directory are rejected.
pub fn resolve_source(models_dir: &Path, name: &str) -> Result<ModelSource, InferenceError> {
    let invalid = || InferenceError::Load(format!("Invalid model name: {}", name));

    let components: Vec<Component> = Path::new(name).components().collect();
    if components
        .iter()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(invalid());
    }

    let single = matches!(components.as_slice(), [Component::Normal(_)]);
    let candidate = models_dir.join(name);
    if !single || !candidate.exists() {
        return Ok(ModelSource::Hub(name.to_string()));
    }

    // symlinks inside the models directory must not point out of it
    let root = models_dir.canonicalize().map_err(|e| InferenceError::Load(e.to_string()))?;
    let resolved = candidate.canonicalize().map_err(|e| InferenceError::Load(e.to_string()))?;
    if !resolved.starts_with(&root) {
        return Err(invalid());
    }
    Ok(ModelSource::Local(candidate))
}

/// Drop a leading copy of the prompt from a decoded continuation.
pub fn strip_prompt_echo(prompt: &str, response: &str) -> String {
    match response.strip_prefix(prompt) {
        Some(rest) if !prompt.is_empty() => rest.trim().to_string(),
        _ => response.to_string(),
    }
}

/// A model-ready prompt along with the user message it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Formatted text sent to the model
    pub text: String,
    /// The user's message as received
    pub message: String,
    /// Research block spliced into `text`, if any
    pub research: Option<String>,
}

impl Prompt {
    /// A prompt that is the message itself
    pub fn raw(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            text: message.clone(),
            message,
            research: None,
        }
    }
}

/// Text generation capability used by the HTTP layer
#[async_trait]
pub trait Inference: Send + Sync {
    /// Short backend label for logs
    fn backend_name(&self) -> &str;

    /// Make `model` resident. Idempotent.
    async fn load(&self, model: &str) -> Result<(), InferenceError>;

    /// Generate a continuation of `prompt` with `model`, loading it first if needed.
    async fn generate(
        &self,
        model: &str,
        prompt: &Prompt,
        params: SamplingParams,
    ) -> Result<String, InferenceError>;
}

/// A model runtime that can load weights and run a single generation
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Model: Send + Sync + 'static;

    async fn load(&self, source: ModelSource) -> Result<Self::Model, InferenceError>;

    async fn generate(
        &self,
        model: Arc<Self::Model>,
        prompt: String,
        params: SamplingParams,
    ) -> Result<String, InferenceError>;
}

/// [`Inference`] over a [`Backend`] with an explicit model cache
pub struct LocalInference<B: Backend> {
    backend: B,
    cache: ModelCache<B::Model>,
    models_dir: PathBuf,
}

impl<B: Backend> LocalInference<B> {
    pub fn new(backend: B, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            cache: ModelCache::new(),
            models_dir: models_dir.into(),
        }
    }

    pub fn cache(&self) -> &ModelCache<B::Model> {
        &self.cache
    }

    /// Return the cached model for `name`, loading it on first use.
    pub async fn load_model(&self, name: &str) -> Result<Arc<B::Model>, InferenceError> {
        let source = resolve_source(&self.models_dir, name)?;
        self.cache
            .get_or_load(name, move || async move {
                tracing::info!("Loading model {} from {:?}", name, source);
                self.backend.load(source).await
            })
            .await
    }
}

#[async_trait]
impl<B: Backend> Inference for LocalInference<B> {
    fn backend_name(&self) -> &str {
        "local"
    }

    async fn load(&self, model: &str) -> Result<(), InferenceError> {
        self.load_model(model).await.map(|_| ())
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &Prompt,
        params: SamplingParams,
    ) -> Result<String, InferenceError> {
        let loaded = self.load_model(model).await?;
        let text = self
            .backend
            .generate(loaded, prompt.text.clone(), params)
            .await?;
        Ok(strip_prompt_echo(&prompt.text, &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double that echoes the prompt and counts loads
    struct EchoBackend {
        loads: Arc<AtomicUsize>,
        fail_load: bool,
    }

    #[async_trait]
    impl Backend for EchoBackend {
        type Model = String;

        async fn load(&self, source: ModelSource) -> Result<String, InferenceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(InferenceError::Load("weights missing".to_string()));
            }
            Ok(format!("{:?}", source))
        }

        async fn generate(
            &self,
            _model: Arc<String>,
            prompt: String,
            _params: SamplingParams,
        ) -> Result<String, InferenceError> {
            Ok(format!("{} and then some", prompt))
        }
    }

    fn echo(fail_load: bool) -> (LocalInference<EchoBackend>, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let backend = EchoBackend {
            loads: loads.clone(),
            fail_load,
        };
        (LocalInference::new(backend, "/nonexistent"), loads)
    }

    #[test]
    fn test_strip_prompt_echo() {
        assert_eq!(strip_prompt_echo("Hi", "Hi there "), "there");
        assert_eq!(strip_prompt_echo("Hi", "Hello"), "Hello");
        assert_eq!(strip_prompt_echo("", " keep "), " keep ");
    }

    #[test]
    fn test_resolve_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("local")).unwrap();

        assert_eq!(
            resolve_source(dir.path(), "local").unwrap(),
            ModelSource::Local(dir.path().join("local"))
        );
        assert_eq!(
            resolve_source(dir.path(), "gpt2").unwrap(),
            ModelSource::Hub("gpt2".to_string())
        );
        assert_eq!(
            resolve_source(dir.path(), "microsoft/DialoGPT-medium").unwrap(),
            ModelSource::Hub("microsoft/DialoGPT-medium".to_string())
        );
    }

    #[test]
    fn test_resolve_source_stays_in_models_dir() {
        let outer = tempfile::tempdir().unwrap();
        let models = outer.path().join("models");
        std::fs::create_dir(&models).unwrap();
        std::fs::create_dir(outer.path().join("elsewhere")).unwrap();

        assert!(matches!(
            resolve_source(&models, "../elsewhere"),
            Err(InferenceError::Load(_))
        ));
        let absolute = outer.path().join("elsewhere");
        assert!(resolve_source(&models, absolute.to_str().unwrap()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_source_rejects_escaping_symlink() {
        let outer = tempfile::tempdir().unwrap();
        let models = outer.path().join("models");
        std::fs::create_dir(&models).unwrap();
        std::fs::create_dir(outer.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(outer.path().join("elsewhere"), models.join("link")).unwrap();

        assert!(resolve_source(&models, "link").is_err());
    }

    #[tokio::test]
    async fn test_escaping_name_never_reaches_backend() {
        let (inference, loads) = echo(false);

        assert!(inference.load("../../etc").await.is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_is_cached() {
        let (inference, loads) = echo(false);

        let first = inference.load_model("gpt2").await.unwrap();
        let second = inference.load_model("gpt2").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(inference.cache().load_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_strips_echo() {
        let (inference, _) = echo(false);
        let text = inference
            .generate("gpt2", &Prompt::raw("Tell me"), SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(text, "and then some");
    }

    #[tokio::test]
    async fn test_failed_load_not_cached() {
        let (inference, loads) = echo(true);

        let err = inference.load("gpt2").await.unwrap_err();
        assert!(matches!(err, InferenceError::Load(_)));
        assert!(inference.load("gpt2").await.is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(inference.cache().is_empty());
    }
}
