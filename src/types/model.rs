//! Model types
//!
//! A model identifier is resolved once into a [`ModelProfile`]; prompt
//! formatting, parameter suggestion and memory estimation are lookups on its
//! tags rather than repeated substring checks.

use serde::{Deserialize, Serialize};

/// Prompt-formatting family of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Code completion models (codegen, code*)
    Code,
    /// Vision / multimodal models
    Multimodal,
    /// Chat or instruction-tuned models
    Chat,
    /// Anything else, prompted with raw text
    General,
}

impl ModelFamily {
    /// Resolve the family from an identifier. Code wins over multimodal, which
    /// wins over chat.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("codegen") || lower.contains("code") {
            ModelFamily::Code
        } else if lower.contains("vision") || lower.contains("multimodal") {
            ModelFamily::Multimodal
        } else if lower.contains("chat") || lower.contains("instruct") {
            ModelFamily::Chat
        } else {
            ModelFamily::General
        }
    }
}

/// Architecture lineage used for parameter suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelLineage {
    Gpt,
    Llama,
    Flan,
    Phi,
    Other,
}

impl ModelLineage {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("gpt") {
            ModelLineage::Gpt
        } else if lower.contains("llama") {
            ModelLineage::Llama
        } else if lower.contains("flan") {
            ModelLineage::Flan
        } else if lower.contains("phi") {
            ModelLineage::Phi
        } else {
            ModelLineage::Other
        }
    }
}

/// Parameter-count class parsed from the identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeClass {
    #[serde(rename = "70b")]
    B70,
    #[serde(rename = "13b")]
    B13,
    #[serde(rename = "7b")]
    B7,
    #[serde(rename = "3b")]
    B3,
    /// 1b or anything tagged "small"
    #[serde(rename = "small")]
    Small,
    #[serde(rename = "unknown")]
    Unknown,
}

impl SizeClass {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("70b") {
            SizeClass::B70
        } else if lower.contains("13b") {
            SizeClass::B13
        } else if lower.contains("7b") {
            SizeClass::B7
        } else if lower.contains("3b") {
            SizeClass::B3
        } else if lower.contains("1b") || lower.contains("small") {
            SizeClass::Small
        } else {
            SizeClass::Unknown
        }
    }
}

/// A model identifier together with its resolved tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Local folder name or external hub identifier
    pub name: String,
    pub family: ModelFamily,
    pub lineage: ModelLineage,
    pub size: SizeClass,
}

impl ModelProfile {
    pub fn resolve(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            family: ModelFamily::from_name(&name),
            lineage: ModelLineage::from_name(&name),
            size: SizeClass::from_name(&name),
            name,
        }
    }
}
