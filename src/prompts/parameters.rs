//! Parameter suggestions and memory estimates
//!
//! Lookup tables keyed on the lineage and size tags of a [`ModelProfile`].

use serde::{Deserialize, Serialize};

use crate::types::config::SamplingParams;
use crate::types::model::{ModelLineage, ModelProfile, SizeClass};

/// Kind of work a request is doing, used to tune gpt-style models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Chat,
    Code,
    Creative,
}

impl TaskType {
    /// Unknown task names fall back to chat.
    pub fn parse(task: &str) -> Self {
        match task.trim().to_lowercase().as_str() {
            "code" => TaskType::Code,
            "creative" => TaskType::Creative,
            _ => TaskType::Chat,
        }
    }
}

/// Suggested generation settings for a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub repetition_penalty: f32,
    pub do_sample: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
            repetition_penalty: 1.1,
            do_sample: true,
        }
    }
}

impl GenerationParameters {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }
}

/// Suggest parameters for `profile` doing `task`
pub fn suggest_parameters(profile: &ModelProfile, task: TaskType) -> GenerationParameters {
    let mut params = GenerationParameters::default();

    match profile.lineage {
        ModelLineage::Gpt => match task {
            TaskType::Code => {
                params.temperature = 0.2;
                params.top_p = 0.95;
            }
            TaskType::Creative => {
                params.temperature = 0.9;
                params.top_p = 0.9;
            }
            TaskType::Chat => {}
        },
        ModelLineage::Llama => {
            params.repetition_penalty = 1.05;
            if profile.size == SizeClass::B7 {
                params.max_tokens = 256;
            }
        }
        ModelLineage::Flan => {
            params.temperature = 0.3;
            params.top_p = 0.95;
        }
        ModelLineage::Phi => {
            params.temperature = 0.6;
            params.max_tokens = 384;
        }
        ModelLineage::Other => {}
    }

    params
}

/// Rough memory requirements for a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEstimate {
    pub ram: String,
    pub vram: String,
    pub recommendation: String,
}

impl MemoryEstimate {
    fn new(ram: &str, vram: &str, recommendation: &str) -> Self {
        Self {
            ram: ram.to_string(),
            vram: vram.to_string(),
            recommendation: recommendation.to_string(),
        }
    }
}

pub fn estimate_memory(size: SizeClass) -> MemoryEstimate {
    match size {
        SizeClass::B70 => MemoryEstimate::new("~140GB", "~80GB", "Use quantization"),
        SizeClass::B13 => MemoryEstimate::new("~26GB", "~15GB", "Consider 8-bit loading"),
        SizeClass::B7 => MemoryEstimate::new("~14GB", "~8GB", "Should run well"),
        SizeClass::B3 => MemoryEstimate::new("~6GB", "~4GB", "Efficient for most systems"),
        SizeClass::Small => MemoryEstimate::new("~2GB", "~1GB", "Very efficient"),
        SizeClass::Unknown => MemoryEstimate::new("Unknown", "Unknown", "Check model documentation"),
    }
}
