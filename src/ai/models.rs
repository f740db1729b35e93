// SPDX-License-Identifier: MIT

//! Model registry - static catalog of selectable models
//!
//! Every entry maps a logical model id to a provider family and the wire
//! model name that provider expects. The special `best` entry is resolved
//! at request time by provider priority.

use crate::ai::error::QueryError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selector that asks the registry to pick a model by provider priority
pub const BEST_MODEL_ID: &str = "best";

/// Upstream API family a model is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google generative-content API (Gemini)
    Google,
    /// NVIDIA chat-completions API
    Nvidia,
    /// OpenRouter chat-completions API
    OpenRouter,
    /// Placeholder kind of the `best` entry; never dispatched
    Auto,
}

impl ProviderKind {
    /// Order in which `best` looks for a provider with registered models
    pub const BEST_PRIORITY: [ProviderKind; 3] =
        [ProviderKind::Google, ProviderKind::Nvidia, ProviderKind::OpenRouter];

    /// Human-readable provider name, used in error messages and reports
    pub fn label(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Nvidia => "NVIDIA",
            Self::OpenRouter => "OpenRouter",
            Self::Auto => "Auto",
        }
    }

    /// Whether the provider can return a separate reasoning trace
    pub fn supports_reasoning(self) -> bool {
        matches!(self, Self::Nvidia)
    }

    pub fn is_concrete(self) -> bool {
        self != Self::Auto
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Registry entry for one selectable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub provider_label: String,
    pub provider_kind: ProviderKind,
    /// Provider-specific model identifier; `None` only for the auto entry
    pub wire_model_name: Option<String>,
}

impl ModelDescriptor {
    pub fn new(
        id: &str,
        display_name: &str,
        description: &str,
        provider_kind: ProviderKind,
        wire_model_name: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            provider_label: provider_kind.label().to_string(),
            provider_kind,
            wire_model_name: Some(wire_model_name.to_string()),
        }
    }

    /// The `best` entry
    pub fn auto() -> Self {
        Self {
            id: BEST_MODEL_ID.to_string(),
            display_name: "Best".to_string(),
            description: "Optimal for learning".to_string(),
            provider_label: ProviderKind::Auto.label().to_string(),
            provider_kind: ProviderKind::Auto,
            wire_model_name: None,
        }
    }

    /// Wire model name, empty for the auto entry
    pub fn wire_name(&self) -> &str {
        self.wire_model_name.as_deref().unwrap_or_default()
    }
}

static BUILTIN: Lazy<ModelRegistry> = Lazy::new(|| ModelRegistry {
    models: vec![
        ModelDescriptor::auto(),
        ModelDescriptor::new(
            "deepseek-r1-0528",
            "DeepSeek R1 0528",
            "Reasoning-optimized free model",
            ProviderKind::OpenRouter,
            "deepseek/deepseek-r1-0528:free",
        ),
        ModelDescriptor::new(
            "mistral-7b",
            "Mistral 7B",
            "Great for general tasks",
            ProviderKind::OpenRouter,
            "mistralai/mistral-7b-instruct:free",
        ),
        ModelDescriptor::new(
            "qwen-235b",
            "Qwen3 235B A22B",
            "Massive reasoning + multilingual capabilities",
            ProviderKind::OpenRouter,
            "qwen/qwen3-235b-a22b:free",
        ),
        ModelDescriptor::new(
            "gemini-flash",
            "Gemini 2.0 Flash",
            "Lightning fast responses",
            ProviderKind::Google,
            "gemini-2.0-flash",
        ),
        ModelDescriptor::new(
            "gemini-flash-15",
            "Gemini 1.5 Flash",
            "Balanced speed and quality",
            ProviderKind::Google,
            "gemini-1.5-flash",
        ),
        ModelDescriptor::new(
            "nemotron-70b",
            "Nemotron 70B",
            "Powerful reasoning capabilities",
            ProviderKind::Nvidia,
            "nvidia/llama-3.1-nemotron-70b-instruct",
        ),
    ],
});

/// Immutable, ordered catalog of models
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Build a registry from custom descriptors.
    ///
    /// Fails if any non-auto descriptor lacks a wire model name, if ids are
    /// duplicated, or if there is no concrete model to fall back to.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self, QueryError> {
        for (i, model) in models.iter().enumerate() {
            if model.provider_kind.is_concrete()
                && model.wire_model_name.as_deref().map_or(true, str::is_empty)
            {
                return Err(QueryError::config(format!(
                    "model '{}' has no wire model name",
                    model.id
                )));
            }
            if models[..i].iter().any(|m| m.id == model.id) {
                return Err(QueryError::config(format!(
                    "duplicate model id '{}'",
                    model.id
                )));
            }
        }

        let registry = Self { models };
        if registry.best_model().is_none() {
            return Err(QueryError::config(
                "registry needs at least one model from a known provider",
            ));
        }
        Ok(registry)
    }

    /// The process-wide built-in catalog
    pub fn builtin() -> &'static ModelRegistry {
        &BUILTIN
    }

    /// Resolve a selector to a concrete model.
    ///
    /// `best` and unknown ids both resolve by provider priority.
    pub fn resolve(&self, selector: &str) -> &ModelDescriptor {
        let found = self
            .get(selector)
            .filter(|m| m.provider_kind.is_concrete());
        match found {
            Some(model) => model,
            None => {
                if selector != BEST_MODEL_ID {
                    log::debug!("Unknown model '{}', falling back to best", selector);
                }
                self.best()
            }
        }
    }

    /// Highest-priority concrete model
    pub fn best(&self) -> &ModelDescriptor {
        // `new` and the builtin catalog both guarantee a concrete model exists
        self.best_model()
            .or_else(|| self.models.iter().find(|m| m.provider_kind.is_concrete()))
            .unwrap_or(&self.models[0])
    }

    fn best_model(&self) -> Option<&ModelDescriptor> {
        ProviderKind::BEST_PRIORITY
            .iter()
            .find_map(|kind| self.list_by_provider(*kind).into_iter().next())
    }

    /// Models served by one provider, in catalog order
    pub fn list_by_provider(&self, kind: ProviderKind) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| m.provider_kind == kind)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Every model except the auto entry
    pub fn custom_models(&self) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| m.provider_kind.is_concrete())
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin().clone()
    }
}
