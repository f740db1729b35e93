// SPDX-License-Identifier: MIT

//! Chat-completions adapter - NVIDIA and OpenRouter
//!
//! Both providers speak the same `/chat/completions` protocol; they differ in
//! attribution headers and in whether a thinking budget may be requested.

use super::sse;
use super::{
    json_body, non_empty_str, upstream_error, CompletionStream, ProviderAdapter,
    ProviderSettings,
};
use crate::ai::chat::{
    ChatMessage, Completion, GenerationOptions, StreamDelta, NO_RESPONSE_PLACEHOLDER,
};
use crate::ai::error::{ProviderError, QueryError};
use crate::ai::models::{ModelDescriptor, ProviderKind};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response};
use serde_json::{json, Value};

/// Adapter for chat-completions style providers
pub struct ChatCompletionsAdapter {
    client: Client,
    kind: ProviderKind,
    settings: ProviderSettings,
    extra_headers: Vec<(&'static str, String)>,
}

impl ChatCompletionsAdapter {
    /// NVIDIA API catalog; supports reasoning budgets
    pub fn nvidia(settings: ProviderSettings) -> Result<Self, QueryError> {
        Ok(Self {
            client: settings.client()?,
            kind: ProviderKind::Nvidia,
            settings,
            extra_headers: Vec::new(),
        })
    }

    /// OpenRouter; sends the attribution headers OpenRouter asks for
    pub fn openrouter(
        settings: ProviderSettings,
        site_url: impl Into<String>,
        app_title: impl Into<String>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            client: settings.client()?,
            kind: ProviderKind::OpenRouter,
            settings,
            extra_headers: vec![("HTTP-Referer", site_url.into()), ("X-Title", app_title.into())],
        })
    }

    fn request_body(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": model.wire_name(),
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "top_p": options.top_p,
            "frequency_penalty": options.frequency_penalty,
            "presence_penalty": options.presence_penalty,
            "stream": stream
        });

        if options.enable_reasoning {
            if self.kind.supports_reasoning() {
                let (min, max) = options.thinking_budget();
                body["extra_body"] = json!({
                    "min_thinking_tokens": min,
                    "max_thinking_tokens": max
                });
            } else {
                log::debug!("{} has no reasoning support, ignoring flag", self.kind);
            }
        }

        body
    }

    /// POST the body and return the response if its status is a success
    async fn post(&self, body: &Value) -> Result<Response, ProviderError> {
        let api_key = self.settings.credential(self.kind)?;
        let url = format!("{}/chat/completions", self.settings.base_url);

        log::debug!(
            "{} request body: {}",
            self.kind,
            serde_json::to_string_pretty(body).unwrap_or_default()
        );

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers {
            request = request.header(*name, value);
        }

        let resp = request
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.kind.label(), e))?;

        if !resp.status().is_success() {
            return Err(upstream_error(self.kind, resp).await);
        }
        Ok(resp)
    }

    /// Parse a chat-completions response, substituting a placeholder for missing text
    fn parse_response(response: &Value) -> Completion {
        let content = non_empty_str(response, "/choices/0/message/content").unwrap_or_else(|| {
            log::warn!("Response has no message content: {}", response);
            NO_RESPONSE_PLACEHOLDER.to_string()
        });

        Completion {
            content,
            reasoning: non_empty_str(response, "/choices/0/message/reasoning_content"),
            usage: response.get("usage").filter(|u| !u.is_null()).cloned(),
            model: non_empty_str(response, "/model"),
        }
    }

    /// Deltas carried by one streamed chunk
    fn parse_stream_event(event: &Value) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        if let Some(reasoning) = non_empty_str(event, "/choices/0/delta/reasoning_content") {
            deltas.push(StreamDelta::Reasoning(reasoning));
        }
        if let Some(text) = non_empty_str(event, "/choices/0/delta/content") {
            deltas.push(StreamDelta::Text(text));
        }
        if let Some(usage) = event.get("usage").filter(|u| !u.is_null()) {
            deltas.push(StreamDelta::Usage(usage.clone()));
        }
        deltas
    }
}

#[async_trait]
impl ProviderAdapter for ChatCompletionsAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Completion, ProviderError> {
        let body = self.request_body(model, messages, options, false);
        let resp = self.post(&body).await?;
        let resp_json = json_body(self.kind, resp).await?;
        log::debug!("{} response: {}", self.kind, resp_json);

        Ok(Self::parse_response(&resp_json))
    }

    async fn send_stream(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CompletionStream, ProviderError> {
        let body = self.request_body(model, messages, options, true);
        let resp = self.post(&body).await?;
        let kind = self.kind;

        let deltas = sse::data_events(kind, resp.bytes_stream()).flat_map(move |event| {
            let items: Vec<Result<StreamDelta, ProviderError>> = match event {
                Ok(data) => match serde_json::from_str::<Value>(&data) {
                    Ok(value) => Self::parse_stream_event(&value).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(ProviderError::invalid_response(kind.label(), e.to_string()))],
                },
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        });

        Ok(Box::pin(deltas))
    }
}
