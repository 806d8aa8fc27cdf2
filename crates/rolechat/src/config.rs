//! Chat configuration: model identifiers, generation parameters, and the
//! per-request settings snapshot validated before every turn.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::ConfigError;

// ── ModelName ──────────────────────────────────────────────────────

/// Supported Gemini model identifiers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ModelName {
    #[default]
    #[serde(rename = "gemini-2.0-flash")]
    Gemini20Flash,
    #[serde(rename = "gemini-1.5-flash")]
    Gemini15Flash,
    #[serde(rename = "gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "gemini-1.5-pro")]
    Gemini15Pro,
    #[serde(rename = "gemini-2.5-pro")]
    Gemini25Pro,
}

impl ModelName {
    pub const ALL: [ModelName; 5] = [
        ModelName::Gemini20Flash,
        ModelName::Gemini15Flash,
        ModelName::Gemini25Flash,
        ModelName::Gemini15Pro,
        ModelName::Gemini25Pro,
    ];

    /// The flash-only menu of the multi-role page.
    pub const FLASH: [ModelName; 3] = [
        ModelName::Gemini20Flash,
        ModelName::Gemini15Flash,
        ModelName::Gemini25Flash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelName::Gemini20Flash => "gemini-2.0-flash",
            ModelName::Gemini15Flash => "gemini-1.5-flash",
            ModelName::Gemini25Flash => "gemini-2.5-flash",
            ModelName::Gemini15Pro => "gemini-1.5-pro",
            ModelName::Gemini25Pro => "gemini-2.5-pro",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let needle = s.trim();
        ModelName::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ConfigError::UnsupportedModel(needle.to_string()))
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── GenerationParams ───────────────────────────────────────────────

pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const TOP_P_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const TOP_K_RANGE: RangeInclusive<u32> = 1..=100;
pub const MAX_OUTPUT_TOKENS_RANGE: RangeInclusive<u32> = 32..=2048;

/// Sampling controls sent with every model request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct GenerationParams {
    /// Sampling temperature. Default: `0.7`.
    pub temperature: f32,
    /// Nucleus sampling threshold. Default: `0.9`.
    pub top_p: f32,
    /// Top-k sampling. Default: `40`.
    pub top_k: u32,
    /// Response length cap. Default: `512`.
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 512,
        }
    }
}

impl GenerationParams {
    /// Reject values outside the documented ranges (NaN included).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(out_of_range("temperature", self.temperature, &TEMPERATURE_RANGE));
        }
        if !TOP_P_RANGE.contains(&self.top_p) {
            return Err(out_of_range("top_p", self.top_p, &TOP_P_RANGE));
        }
        if !TOP_K_RANGE.contains(&self.top_k) {
            return Err(out_of_range("top_k", self.top_k, &TOP_K_RANGE));
        }
        if !MAX_OUTPUT_TOKENS_RANGE.contains(&self.max_output_tokens) {
            return Err(out_of_range(
                "max_output_tokens",
                self.max_output_tokens,
                &MAX_OUTPUT_TOKENS_RANGE,
            ));
        }
        Ok(())
    }
}

fn out_of_range<T: std::fmt::Display>(
    name: &'static str,
    value: T,
    range: &RangeInclusive<T>,
) -> ConfigError {
    ConfigError::ParameterOutOfRange {
        name,
        value: value.to_string(),
        range: format!("{}..={}", range.start(), range.end()),
    }
}

// ── ChatSettings ───────────────────────────────────────────────────

/// Configuration snapshot the presentation layer holds for one request.
#[derive(Clone, Default)]
pub struct ChatSettings {
    pub api_key: String,
    pub model: ModelName,
    pub params: GenerationParams,
    /// Models the page offers. Empty means any supported model.
    pub allowed_models: Vec<ModelName>,
}

impl ChatSettings {
    pub fn new(api_key: impl Into<String>, model: ModelName) -> Self {
        Self {
            api_key: api_key.into(),
            model,
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_allowed_models(mut self, models: &[ModelName]) -> Self {
        self.allowed_models = models.to_vec();
        self
    }

    /// Preconditions for contacting the model service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !self.allowed_models.is_empty() && !self.allowed_models.contains(&self.model) {
            return Err(ConfigError::UnsupportedModel(self.model.to_string()));
        }
        self.params.validate()
    }
}

impl std::fmt::Debug for ChatSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSettings")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("params", &self.params)
            .field("allowed_models", &self.allowed_models)
            .finish()
    }
}

/// Mask a secret for display. Empty stays empty.
pub fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "***" }
}
