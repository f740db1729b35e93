// SPDX-License-Identifier: MIT

//! Provider module - defines the adapter trait and its implementations
//!
//! Each adapter owns everything protocol-specific for one upstream API
//! family: request shape, authentication, response envelope and error
//! envelope.
//! - [chat_completions] - NVIDIA and OpenRouter (chat-completions style)
//! - [gemini] - Google Gemini (generative-content style)

pub mod chat_completions;
pub mod gemini;
mod sse;

use crate::ai::chat::{ChatMessage, Completion, GenerationOptions, GenerationResult, StreamDelta};
use crate::ai::error::{ProviderError, QueryError};
use crate::ai::models::{ModelDescriptor, ProviderKind};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use reqwest::{Client, Response};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

pub use chat_completions::ChatCompletionsAdapter;
pub use gemini::GeminiAdapter;

/// Live, incremental provider output
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, ProviderError>> + Send>>;

/// Core trait for provider adapters
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider family this adapter talks to
    fn kind(&self) -> ProviderKind;

    /// Perform one request and decode the provider's answer
    async fn complete(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Completion, ProviderError>;

    /// Perform one request, normalizing any failure into the result
    async fn send(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> GenerationResult {
        match self.complete(model, messages, options).await {
            Ok(completion) => completion.into(),
            Err(e) => {
                log::error!("{} request for {} failed: {}", self.kind(), model.id, e);
                GenerationResult::failure(e.to_string())
            }
        }
    }

    /// Stream the answer as it is generated.
    ///
    /// The default implementation waits for the complete answer and yields
    /// it as a single stream.
    async fn send_stream(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CompletionStream, ProviderError> {
        let completion = self.complete(model, messages, options).await?;
        Ok(Box::pin(stream::iter(completion_deltas(completion))))
    }
}

fn completion_deltas(completion: Completion) -> Vec<Result<StreamDelta, ProviderError>> {
    let mut deltas = Vec::with_capacity(3);
    if let Some(reasoning) = completion.reasoning {
        deltas.push(Ok(StreamDelta::Reasoning(reasoning)));
    }
    deltas.push(Ok(StreamDelta::Text(completion.content)));
    if let Some(usage) = completion.usage {
        deltas.push(Ok(StreamDelta::Usage(usage)));
    }
    deltas
}

/// Connection settings for one provider
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Transport timeout for each request
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// The configured credential, or a configuration error naming the provider
    pub(crate) fn credential(&self, kind: ProviderKind) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::ApiKeyMissing(kind.label().to_string()))
    }

    pub(crate) fn client(&self) -> Result<Client, QueryError> {
        Ok(Client::builder().timeout(self.timeout).build()?)
    }
}

/// Turn a non-success response into an upstream error.
///
/// Prefers the provider's own `error.message`, then the status text.
pub(crate) async fn upstream_error(kind: ProviderKind, response: Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    log::debug!("{} error body ({}): {}", kind, status, body);

    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_str().to_string())
    });

    ProviderError::Upstream {
        provider: kind.label().to_string(),
        status: status.as_u16(),
        message,
    }
}

/// Extract `error.message` from an error envelope (object or single-item array)
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let envelope = match &value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    envelope
        .pointer("/error/message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Decode a success body as JSON
pub(crate) async fn json_body(kind: ProviderKind, response: Response) -> Result<Value, ProviderError> {
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::transport(kind.label(), e))?;
    serde_json::from_str(&text).map_err(|e| ProviderError::invalid_response(kind.label(), e.to_string()))
}

/// Non-empty string at a JSON pointer
pub(crate) fn non_empty_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
