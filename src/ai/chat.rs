// SPDX-License-Identifier: MIT

//! Provider-neutral chat types shared by the dispatcher and the adapters

use crate::ai::models::ModelDescriptor;
use crate::ai::prompt::PromptMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Placeholder content when a provider answers without the expected text field
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response received";

pub const DEFAULT_MIN_THINKING_TOKENS: u32 = 1000;
pub const DEFAULT_MAX_THINKING_TOKENS: u32 = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generation settings with defaults applied.
///
/// Decoding from JSON is lenient: unknown keys are ignored and unusable
/// values fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub enable_reasoning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_thinking_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_thinking_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PromptMode>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            system_prompt: None,
            enable_reasoning: false,
            min_thinking_tokens: None,
            max_thinking_tokens: None,
            mode: None,
        }
    }
}

impl GenerationOptions {
    /// Decode options from a JSON object, applying defaults once
    pub fn from_value(value: &Value) -> Self {
        let mut options = Self::default();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                log::warn!("Ignoring non-object generation options: {}", value);
            }
            return options;
        };

        if let Some(v) = float_field(map, "temperature") {
            options.temperature = v;
        }
        if let Some(v) = count_field(map, "maxTokens") {
            options.max_tokens = v;
        }
        if let Some(v) = float_field(map, "topP") {
            options.top_p = v;
        }
        if let Some(v) = float_field(map, "frequencyPenalty") {
            options.frequency_penalty = v;
        }
        if let Some(v) = float_field(map, "presencePenalty") {
            options.presence_penalty = v;
        }
        if let Some(v) = map.get("systemPrompt").and_then(Value::as_str) {
            if !v.is_empty() {
                options.system_prompt = Some(v.to_string());
            }
        }
        if let Some(v) = map.get("enableReasoning").and_then(Value::as_bool) {
            options.enable_reasoning = v;
        }
        options.min_thinking_tokens = count_field(map, "minThinkingTokens");
        options.max_thinking_tokens = count_field(map, "maxThinkingTokens");
        if let Some(v) = map.get("mode").and_then(Value::as_str) {
            options.mode = Some(PromptMode::parse(v));
        }

        options
    }

    /// Thinking budget to send when reasoning is enabled
    pub fn thinking_budget(&self) -> (u32, u32) {
        (
            self.min_thinking_tokens
                .unwrap_or(DEFAULT_MIN_THINKING_TOKENS),
            self.max_thinking_tokens
                .unwrap_or(DEFAULT_MAX_THINKING_TOKENS),
        )
    }
}

impl<'de> Deserialize<'de> for GenerationOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

fn float_field(map: &Map<String, Value>, key: &str) -> Option<f32> {
    let value = map.get(key)?;
    match value.as_f64() {
        Some(v) if v.is_finite() => Some(v as f32),
        _ => {
            log::warn!("Ignoring option {}={}, expected a number", key, value);
            None
        }
    }
}

fn count_field(map: &Map<String, Value>, key: &str) -> Option<u32> {
    let value = map.get(key)?;
    match value.as_u64().and_then(|v| u32::try_from(v).ok()) {
        Some(v) if v > 0 => Some(v),
        _ => {
            log::warn!("Ignoring option {}={}, expected a positive integer", key, value);
            None
        }
    }
}

/// What a provider adapter produced for one successful call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub reasoning: Option<String>,
    pub usage: Option<Value>,
    /// Model name as reported by the provider
    pub model: Option<String>,
}

/// Uniform result of a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub model_used: Option<ModelDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl GenerationResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
            usage: None,
            model: None,
            model_used: None,
            reasoning: None,
            timestamp: None,
        }
    }

    /// Stamp the result with the resolved model and the current time
    pub fn annotate(mut self, model: &ModelDescriptor) -> Self {
        self.model_used = Some(model.clone());
        self.timestamp = Some(Utc::now());
        self
    }
}

impl From<Completion> for GenerationResult {
    fn from(completion: Completion) -> Self {
        Self {
            success: true,
            content: Some(completion.content),
            error: None,
            usage: completion.usage,
            model: completion.model,
            model_used: None,
            reasoning: completion.reasoning,
            timestamp: None,
        }
    }
}

/// One web search hit; its 1-based position is its citation number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub display_link: String,
}

/// Incremental output of a streaming generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamDelta {
    Text(String),
    Reasoning(String),
    Usage(Value),
}
