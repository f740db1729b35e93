// SPDX-License-Identifier: MIT

//! Dispatcher - the orchestration entry point
//!
//! Resolves the model, composes the message sequence, routes to the adapter
//! registered for the model's provider and returns a uniform
//! [`GenerationResult`]. Nothing in the generation path escapes as an error
//! or a panic.

use crate::ai::chat::{
    ChatMessage, GenerationOptions, GenerationResult, SearchResult, DEFAULT_MAX_THINKING_TOKENS,
    DEFAULT_MIN_THINKING_TOKENS,
};
use crate::ai::error::ProviderError;
use crate::ai::models::{ModelDescriptor, ModelRegistry, ProviderKind};
use crate::ai::prompt::{PromptComposer, DEFAULT_SYSTEM_PROMPT};
use crate::ai::provider::{CompletionStream, ProviderAdapter};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Prompt used by the connection check
const PING_PROMPT: &str = "Hi";
const PING_MAX_TOKENS: u32 = 10;

/// Routes generation requests to provider adapters
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl Dispatcher {
    /// Create a dispatcher with no adapters registered
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            adapters: HashMap::new(),
        }
    }

    /// Register the adapter for its provider kind, replacing any previous one
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Provider kinds that have an adapter, in priority order
    pub fn providers(&self) -> Vec<ProviderKind> {
        ProviderKind::BEST_PRIORITY
            .into_iter()
            .filter(|kind| self.adapters.contains_key(kind))
            .collect()
    }

    /// Build the message sequence: system, history in order, then the user turn
    pub fn prepare_messages(
        user_message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Vec<ChatMessage> {
        let system = system_prompt
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(user_message));
        messages
    }

    /// Generate a response with the model the selector resolves to
    pub async fn generate_response(
        &self,
        selector: &str,
        user_message: &str,
        history: &[ChatMessage],
        options: &GenerationOptions,
    ) -> GenerationResult {
        let model = self.registry.resolve(selector);
        let messages =
            Self::prepare_messages(user_message, history, options.system_prompt.as_deref());
        self.dispatch(model, &messages, options).await
    }

    /// Generate a response grounded in web search results.
    ///
    /// The system prompt is replaced by the search-context prompt for
    /// `options.mode` (search when unset).
    pub async fn generate_response_with_search(
        &self,
        selector: &str,
        user_message: &str,
        results: &[SearchResult],
        history: &[ChatMessage],
        options: &GenerationOptions,
    ) -> GenerationResult {
        let mode = options.mode.unwrap_or_default();
        let options = GenerationOptions {
            system_prompt: Some(PromptComposer::with_search_context(mode, results)),
            ..options.clone()
        };
        log::debug!(
            "Generating with {} search results in {:?} mode",
            results.len(),
            mode
        );
        self.generate_response(selector, user_message, history, &options)
            .await
    }

    /// Generate a response with a separate reasoning trace.
    ///
    /// Fails without contacting any provider when the resolved model cannot
    /// reason.
    pub async fn generate_with_reasoning(
        &self,
        selector: &str,
        user_message: &str,
        history: &[ChatMessage],
        options: &GenerationOptions,
    ) -> GenerationResult {
        let model = self.registry.resolve(selector);
        if !model.provider_kind.supports_reasoning() {
            let err = ProviderError::ReasoningUnsupported(model.provider_label.clone());
            log::warn!("Rejected reasoning request for {}: {}", model.id, err);
            return GenerationResult::failure(err.to_string());
        }

        let options = GenerationOptions {
            enable_reasoning: true,
            min_thinking_tokens: Some(
                options
                    .min_thinking_tokens
                    .unwrap_or(DEFAULT_MIN_THINKING_TOKENS),
            ),
            max_thinking_tokens: Some(
                options
                    .max_thinking_tokens
                    .unwrap_or(DEFAULT_MAX_THINKING_TOKENS),
            ),
            ..options.clone()
        };
        let messages =
            Self::prepare_messages(user_message, history, options.system_prompt.as_deref());
        self.dispatch(model, &messages, &options).await
    }

    /// Stream a response as the provider generates it
    pub async fn generate_stream(
        &self,
        selector: &str,
        user_message: &str,
        history: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<CompletionStream, ProviderError> {
        let model = self.registry.resolve(selector);
        let adapter = self.adapter_for(model)?;
        let messages =
            Self::prepare_messages(user_message, history, options.system_prompt.as_deref());

        log::info!("Streaming {} via {}", model.id, model.provider_kind);
        adapter.send_stream(model, &messages, options).await
    }

    /// Send a minimal request to every registered provider.
    ///
    /// Requests run concurrently; a failing or panicking request only marks its
    /// own provider as unreachable.
    pub async fn test_connections(&self) -> BTreeMap<String, bool> {
        let options = GenerationOptions {
            max_tokens: PING_MAX_TOKENS,
            ..GenerationOptions::default()
        };

        let mut handles = Vec::new();
        for kind in self.providers() {
            let label = kind.label().to_string();
            let ping_model = self.registry.list_by_provider(kind).first().cloned().cloned();
            let Some(model) = ping_model else {
                log::warn!("No registered model for {}, skipping connection check", label);
                handles.push((label, None));
                continue;
            };
            let Some(adapter) = self.adapters.get(&kind).cloned() else {
                continue;
            };
            let options = options.clone();
            let handle = tokio::spawn(async move {
                let messages = [ChatMessage::user(PING_PROMPT)];
                adapter.send(&model, &messages, &options).await.success
            });
            handles.push((label, Some(handle)));
        }

        let mut results = BTreeMap::new();
        for (label, handle) in handles {
            let ok = match handle {
                Some(handle) => match handle.await {
                    Ok(ok) => ok,
                    Err(e) => {
                        log::error!("{} connection test failed: {}", label, e);
                        false
                    }
                },
                None => false,
            };
            log::info!("{} connection: {}", label, if ok { "ok" } else { "failed" });
            results.insert(label, ok);
        }
        results
    }

    fn adapter_for(&self, model: &ModelDescriptor) -> Result<&Arc<dyn ProviderAdapter>, ProviderError> {
        self.adapters
            .get(&model.provider_kind)
            .ok_or_else(|| ProviderError::AdapterMissing(model.provider_label.clone()))
    }

    async fn dispatch(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> GenerationResult {
        let adapter = match self.adapter_for(model) {
            Ok(adapter) => adapter,
            Err(e) => {
                log::error!("Cannot route {}: {}", model.id, e);
                return GenerationResult::failure(e.to_string());
            }
        };

        log::info!("Routing {} to {}", model.id, model.provider_kind);
        match AssertUnwindSafe(adapter.send(model, messages, options))
            .catch_unwind()
            .await
        {
            Ok(result) => result.annotate(model),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log::error!("{} adapter panicked: {}", model.provider_kind, message);
                GenerationResult::failure(message)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "provider adapter panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::chat::{Completion, Role};
    use crate::ai::prompt::{PromptMode, USER_QUERY_LABEL};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the last request and echoes the system prompt back
    struct RecordingAdapter {
        kind: ProviderKind,
        seen: Mutex<Vec<(String, Vec<ChatMessage>, GenerationOptions)>>,
    }

    impl RecordingAdapter {
        fn new(kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn last(&self) -> (String, Vec<ChatMessage>, GenerationOptions) {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ProviderAdapter for RecordingAdapter {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn complete(
            &self,
            model: &ModelDescriptor,
            messages: &[ChatMessage],
            options: &GenerationOptions,
        ) -> Result<Completion, ProviderError> {
            self.seen.lock().unwrap().push((
                model.id.clone(),
                messages.to_vec(),
                options.clone(),
            ));
            Ok(Completion {
                content: "ok".to_string(),
                reasoning: options.enable_reasoning.then(|| "thought".to_string()),
                usage: None,
                model: Some(model.wire_name().to_string()),
            })
        }
    }

    fn dispatcher(adapters: &[Arc<RecordingAdapter>]) -> Dispatcher {
        adapters.iter().fold(
            Dispatcher::new(Arc::new(ModelRegistry::default())),
            |d, a| d.with_adapter(a.clone()),
        )
    }

    #[test]
    fn test_prepare_messages_order_and_default_prompt() {
        let history = [ChatMessage::user("q1"), ChatMessage::assistant("a1")];
        let messages = Dispatcher::prepare_messages("q2", &history, None);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::system(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(&messages[1..3], &history);
        assert_eq!(messages[3], ChatMessage::user("q2"));

        let messages = Dispatcher::prepare_messages("q", &[], Some(""));
        assert_eq!(messages[0].content, DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_generate_response_annotates_result() {
        let google = RecordingAdapter::new(ProviderKind::Google);
        let result = dispatcher(&[google.clone()])
            .generate_response("best", "hello", &[], &GenerationOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.model_used.unwrap().id, "gemini-flash");
        assert!(result.timestamp.is_some());
        assert_eq!(google.calls(), 1);
    }

    #[tokio::test]
    async fn test_custom_system_prompt_is_used() {
        let google = RecordingAdapter::new(ProviderKind::Google);
        let options = GenerationOptions {
            system_prompt: Some("Answer in French.".to_string()),
            ..GenerationOptions::default()
        };
        dispatcher(&[google.clone()])
            .generate_response("gemini-flash-15", "hello", &[], &options)
            .await;

        let (model, messages, _) = google.last();
        assert_eq!(model, "gemini-flash-15");
        assert_eq!(messages[0], ChatMessage::system("Answer in French."));
    }

    #[tokio::test]
    async fn test_missing_adapter_is_a_failure_result() {
        let result = dispatcher(&[])
            .generate_response("nemotron-70b", "hello", &[], &GenerationOptions::default())
            .await;

        assert!(!result.success);
        assert!(result.content.is_none());
        assert!(result.model_used.is_none());
        assert_eq!(result.error.as_deref(), Some("Service for NVIDIA not found"));
    }

    #[tokio::test]
    async fn test_search_prompt_replaces_system_prompt() {
        let google = RecordingAdapter::new(ProviderKind::Google);
        let results = vec![SearchResult {
            title: "Photosynthesis".to_string(),
            link: "https://example.org/p".to_string(),
            snippet: "Plants convert light.".to_string(),
            display_link: "example.org".to_string(),
        }];
        let options = GenerationOptions {
            system_prompt: Some("ignored".to_string()),
            mode: Some(PromptMode::Research),
            ..GenerationOptions::default()
        };

        dispatcher(&[google.clone()])
            .generate_response_with_search("best", "how?", &results, &[], &options)
            .await;

        let (_, messages, _) = google.last();
        let system = &messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("[1] Photosynthesis"));
        assert!(system.content.contains(PromptComposer::base_prompt(PromptMode::Research)));
        assert!(system.content.ends_with(USER_QUERY_LABEL));
    }

    #[tokio::test]
    async fn test_reasoning_rejected_for_google_without_call() {
        let google = RecordingAdapter::new(ProviderKind::Google);
        let result = dispatcher(&[google.clone()])
            .generate_with_reasoning("gemini-flash", "why?", &[], &GenerationOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Reasoning is not supported by Google models")
        );
        assert_eq!(google.calls(), 0);
    }

    #[tokio::test]
    async fn test_reasoning_forces_flag_and_budget() {
        let nvidia = RecordingAdapter::new(ProviderKind::Nvidia);
        let options = GenerationOptions {
            max_thinking_tokens: Some(2048),
            ..GenerationOptions::default()
        };
        let result = dispatcher(&[nvidia.clone()])
            .generate_with_reasoning("nemotron-70b", "why?", &[], &options)
            .await;

        assert!(result.success);
        assert_eq!(result.reasoning.as_deref(), Some("thought"));
        let (_, _, sent) = nvidia.last();
        assert!(sent.enable_reasoning);
        assert_eq!(sent.thinking_budget(), (1000, 2048));
    }

    #[tokio::test]
    async fn test_stream_without_adapter_errors() {
        let err = dispatcher(&[])
            .generate_stream("best", "hi", &[], &GenerationOptions::default())
            .await
            .err()
            .unwrap();
        assert!(err.is_local());
    }

    #[tokio::test]
    async fn test_connections_send_minimal_request() {
        let nvidia = RecordingAdapter::new(ProviderKind::Nvidia);
        let results = dispatcher(&[nvidia.clone()]).test_connections().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("NVIDIA"), Some(&true));
        let (model, messages, options) = nvidia.last();
        assert_eq!(model, "nemotron-70b");
        assert_eq!(messages, vec![ChatMessage::user("Hi")]);
        assert_eq!(options.max_tokens, 10);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"bang".to_string()), "bang");
        assert_eq!(panic_message(&42u8), "provider adapter panicked");
    }
}
