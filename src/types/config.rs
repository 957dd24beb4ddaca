//! Sampling configuration
//!
//! Generation parameters shared by requests, settings and inference backends.

use serde::{Deserialize, Serialize};

/// Sampling parameters for a single generation call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature parameter for text generation (0.0 - 2.0)
    pub temperature: f32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Maximum number of new tokens to generate
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

impl SamplingParams {
    /// Clamp every value into the range the backends accept.
    pub fn validate(&mut self) {
        if !self.temperature.is_finite() {
            self.temperature = 0.7;
        }
        if !self.top_p.is_finite() {
            self.top_p = 0.9;
        }
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);
        self.max_tokens = self.max_tokens.clamp(1, 65536);
    }

    /// Consuming variant of [`SamplingParams::validate`].
    pub fn validated(mut self) -> Self {
        self.validate();
        self
    }
}
