// SPDX-License-Identifier: MIT

//! Gemini adapter - Google's generative-content API
//!
//! Gemini has no system role: system text is folded into the first user
//! turn, and a user turn is synthesized when the conversation does not start
//! with one.

use super::sse;
use super::{
    json_body, non_empty_str, upstream_error, CompletionStream, ProviderAdapter,
    ProviderSettings,
};
use crate::ai::chat::{
    ChatMessage, Completion, GenerationOptions, Role, StreamDelta, NO_RESPONSE_PLACEHOLDER,
};
use crate::ai::error::{ProviderError, QueryError};
use crate::ai::models::{ModelDescriptor, ProviderKind};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response};
use serde_json::{json, Value};

const KIND: ProviderKind = ProviderKind::Google;

/// Google Gemini adapter
pub struct GeminiAdapter {
    client: Client,
    settings: ProviderSettings,
}

impl GeminiAdapter {
    pub fn new(settings: ProviderSettings) -> Result<Self, QueryError> {
        Ok(Self {
            client: settings.client()?,
            settings,
        })
    }

    /// Convert chat messages to Gemini `contents`
    fn to_contents(messages: &[ChatMessage]) -> Vec<Value> {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut turns: Vec<(&str, String)> = messages
            .iter()
            .filter_map(|m| match m.role {
                Role::System => None,
                Role::User => Some(("user", m.content.clone())),
                Role::Assistant => Some(("model", m.content.clone())),
            })
            .collect();

        if !system.is_empty() {
            let system_text = system.join("\n\n");
            match turns.first_mut() {
                Some((role, text)) if *role == "user" => {
                    *text = format!("{}\n\n{}", system_text, text);
                }
                _ => turns.insert(0, ("user", system_text)),
            }
        }

        turns
            .into_iter()
            .map(|(role, text)| json!({ "role": role, "parts": [{ "text": text }] }))
            .collect()
    }

    fn request_body(messages: &[ChatMessage], options: &GenerationOptions) -> Value {
        if options.enable_reasoning {
            log::debug!("Gemini has no reasoning support, ignoring flag");
        }
        json!({
            "contents": Self::to_contents(messages),
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
                "topP": options.top_p
            }
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Response, ProviderError> {
        let api_key = self.settings.credential(KIND)?;

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(KIND.label(), e))?;

        if !resp.status().is_success() {
            return Err(upstream_error(KIND, resp).await);
        }
        Ok(resp)
    }

    fn parse_response(response: &Value, wire_model: &str) -> Completion {
        if let Some(reason) = response
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
        {
            log::debug!("Gemini finish reason: {}", reason);
        }

        let content = non_empty_str(response, "/candidates/0/content/parts/0/text")
            .unwrap_or_else(|| {
                log::warn!("Gemini response has no text part: {}", response);
                NO_RESPONSE_PLACEHOLDER.to_string()
            });

        Completion {
            content,
            reasoning: None,
            usage: response.get("usageMetadata").filter(|u| !u.is_null()).cloned(),
            model: Some(wire_model.to_string()),
        }
    }

    /// Deltas carried by one streamed `GenerateContentResponse`
    fn parse_stream_event(event: &Value) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        let text: String = event
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
            .unwrap_or_default();
        if !text.is_empty() {
            deltas.push(StreamDelta::Text(text));
        }
        if let Some(usage) = event.get("usageMetadata").filter(|u| !u.is_null()) {
            deltas.push(StreamDelta::Usage(usage.clone()));
        }
        deltas
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Completion, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url,
            model.wire_name()
        );
        let body = Self::request_body(messages, options);
        let resp = self.post(&url, &body).await?;
        let resp_json = json_body(KIND, resp).await?;
        log::debug!("Gemini response: {}", resp_json);

        Ok(Self::parse_response(&resp_json, model.wire_name()))
    }

    async fn send_stream(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CompletionStream, ProviderError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.settings.base_url,
            model.wire_name()
        );
        let body = Self::request_body(messages, options);
        let resp = self.post(&url, &body).await?;

        let deltas = sse::data_events(KIND, resp.bytes_stream()).flat_map(|event| {
            let items: Vec<Result<StreamDelta, ProviderError>> = match event {
                Ok(data) => match serde_json::from_str::<Value>(&data) {
                    Ok(value) => Self::parse_stream_event(&value).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(ProviderError::invalid_response(KIND.label(), e.to_string()))],
                },
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        });

        Ok(Box::pin(deltas))
    }
}
