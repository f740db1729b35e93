// SPDX-License-Identifier: MIT

//! Typed error handling for query-rs
//!
//! `ProviderError` covers everything that can go wrong between the dispatcher
//! and an upstream model API. `QueryError` is the application-level error used
//! by configuration, web search and the server.

use thiserror::Error;

/// Top-level error type for query-rs
#[derive(Debug, Error)]
pub enum QueryError {
    /// Configuration errors (missing credentials, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web search collaborator errors
    #[error("Search error: {0}")]
    Search(String),

    /// A provider stream that could not be opened
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised while talking to an upstream model provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No credential configured for the provider; detected before any request
    #[error("{0} API key not found")]
    ApiKeyMissing(String),

    /// Network failure reaching the provider
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    /// Provider answered with a non-success status
    #[error("{provider} API error: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    /// Provider answered with a body that could not be decoded at all
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Reasoning generation requested against a provider without reasoning support
    #[error("Reasoning is not supported by {0} models")]
    ReasoningUnsupported(String),

    /// The dispatcher has no adapter registered for the resolved provider
    #[error("Service for {0} not found")]
    AdapterMissing(String),
}

impl QueryError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a search error
    pub fn search(message: impl Into<String>) -> Self {
        Self::Search(message.into())
    }
}

impl ProviderError {
    pub fn transport(provider: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: err.to_string(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True when the error was detected locally, without any network traffic
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::ApiKeyMissing(_) | Self::ReasoningUnsupported(_) | Self::AdapterMissing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_missing_message() {
        let err = ProviderError::ApiKeyMissing("NVIDIA".to_string());
        assert_eq!(err.to_string(), "NVIDIA API key not found");
        assert!(err.is_local());
    }

    #[test]
    fn test_upstream_message_names_provider() {
        let err = ProviderError::Upstream {
            provider: "Google".to_string(),
            status: 400,
            message: "API key not valid".to_string(),
        };
        assert_eq!(err.to_string(), "Google API error: API key not valid");
        assert!(!err.is_local());
    }

    #[test]
    fn test_provider_error_converts_into_query_error() {
        let err: QueryError = ProviderError::ReasoningUnsupported("Google".to_string()).into();
        assert_eq!(err.to_string(), "Reasoning is not supported by Google models");
    }
}
