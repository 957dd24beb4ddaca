//! Simulated inference
//!
//! Used when the native backend is unavailable so the chat API keeps
//! answering with a placeholder instead of failing.

use async_trait::async_trait;

use crate::inference::{Inference, InferenceError, Prompt};
use crate::types::config::SamplingParams;

/// Characters of research context previewed in a simulated reply
const RESEARCH_PREVIEW_CHARS: usize = 100;

pub struct SimulatedInference;

#[async_trait]
impl Inference for SimulatedInference {
    fn backend_name(&self) -> &str {
        "simulated"
    }

    async fn load(&self, _model: &str) -> Result<(), InferenceError> {
        Ok(())
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &Prompt,
        _params: SamplingParams,
    ) -> Result<String, InferenceError> {
        tracing::debug!("Simulating response for model {}", model);

        let mut response = format!("Model response simulation for: {}", prompt.message);
        if let Some(research) = prompt.research.as_deref() {
            let preview: String = research.chars().take(RESEARCH_PREVIEW_CHARS).collect();
            response.push_str(&format!("\n\n(Enhanced with research: {}...)", preview));
        }
        Ok(response)
    }
}
