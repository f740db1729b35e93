//! Integration tests for dispatching, search grounding and citation rendering
//!
//! These tests drive the public API end to end using mock adapters and a mock
//! search backend, plus one wiremock-backed run through the real adapters.

use async_trait::async_trait;
use query_rs::ai::chat::{Completion, NO_RESPONSE_PLACEHOLDER};
use query_rs::ai::models::{ModelDescriptor, ModelRegistry, ProviderKind};
use query_rs::ai::provider::{ChatCompletionsAdapter, GeminiAdapter, ProviderSettings};
use query_rs::ai::{
    linkify_citations, ChatMessage, Dispatcher, GenerationOptions, ProviderAdapter,
    ProviderError, QueryError, SearchResult,
};
use query_rs::query::{QueryRequest, QueryService, SearchResponse, WebSearch};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Mock Components
// ============================================================================

enum Behavior {
    Reply(&'static str),
    Fail(fn() -> ProviderError),
    Panic,
}

/// Mock adapter that counts calls and records the last request
struct MockAdapter {
    kind: ProviderKind,
    behavior: Behavior,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockAdapter {
    fn new(kind: ProviderKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behavior,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    fn replying(kind: ProviderKind, text: &'static str) -> Arc<Self> {
        Self::new(kind, Behavior::Reply(text))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        match &self.behavior {
            Behavior::Reply(text) => Ok(Completion {
                content: text.to_string(),
                reasoning: options.enable_reasoning.then(|| "step by step".to_string()),
                usage: Some(json!({ "total_tokens": 12 })),
                model: Some(model.wire_name().to_string()),
            }),
            Behavior::Fail(make) => Err(make()),
            Behavior::Panic => panic!("adapter exploded"),
        }
    }
}

/// Mock search backend returning fixed results
struct MockSearch {
    results: Vec<SearchResult>,
    calls: AtomicUsize,
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, query: &str) -> Result<SearchResponse, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SearchResponse {
            query: query.to_string(),
            results: self.results.clone(),
            total_results: self.results.len().to_string(),
            search_time: 0.1,
        })
    }
}

fn photosynthesis_sources() -> Vec<SearchResult> {
    vec![
        SearchResult {
            title: "Photosynthesis - Wikipedia".to_string(),
            link: "https://en.wikipedia.org/wiki/Photosynthesis".to_string(),
            snippet: "Photosynthesis is a process used by plants to convert light energy."
                .to_string(),
            display_link: "en.wikipedia.org".to_string(),
        },
        SearchResult {
            title: "How plants make food".to_string(),
            link: "https://example.edu/plants".to_string(),
            snippet: "Chlorophyll absorbs sunlight.".to_string(),
            display_link: "example.edu".to_string(),
        },
    ]
}

fn dispatcher_with(adapters: Vec<Arc<MockAdapter>>) -> Dispatcher {
    adapters
        .into_iter()
        .fold(Dispatcher::new(Arc::new(ModelRegistry::default())), |d, a| {
            d.with_adapter(a)
        })
}

fn all_providers() -> (Arc<MockAdapter>, Arc<MockAdapter>, Arc<MockAdapter>) {
    (
        MockAdapter::replying(ProviderKind::Google, "google answer"),
        MockAdapter::replying(ProviderKind::Nvidia, "nvidia answer"),
        MockAdapter::replying(ProviderKind::OpenRouter, "openrouter answer"),
    )
}

// ============================================================================
// Model Resolution
// ============================================================================

#[tokio::test]
async fn test_unknown_model_falls_back_to_best() {
    let (google, nvidia, openrouter) = all_providers();
    let dispatcher = dispatcher_with(vec![google.clone(), nvidia.clone(), openrouter.clone()]);

    let options = GenerationOptions::default();
    let best = dispatcher.generate_response("best", "hi", &[], &options).await;
    let unknown = dispatcher
        .generate_response("no-such-model", "hi", &[], &options)
        .await;

    assert!(best.success && unknown.success);
    assert_eq!(best.model_used, unknown.model_used);
    assert_eq!(best.model_used.unwrap().provider_kind, ProviderKind::Google);
    assert_eq!(google.calls(), 2);
    assert_eq!(nvidia.calls() + openrouter.calls(), 0);
}

#[tokio::test]
async fn test_each_provider_is_routed_to_its_adapter() {
    let (google, nvidia, openrouter) = all_providers();
    let dispatcher = dispatcher_with(vec![google.clone(), nvidia.clone(), openrouter.clone()]);
    let options = GenerationOptions::default();

    for (selector, expected) in [
        ("gemini-flash-15", "google answer"),
        ("nemotron-70b", "nvidia answer"),
        ("qwen-235b", "openrouter answer"),
    ] {
        let result = dispatcher.generate_response(selector, "hi", &[], &options).await;
        assert_eq!(result.content.as_deref(), Some(expected));
        assert_eq!(result.model_used.unwrap().id, selector);
    }
    assert_eq!((google.calls(), nvidia.calls(), openrouter.calls()), (1, 1, 1));
}

// ============================================================================
// Search Grounding
// ============================================================================

#[tokio::test]
async fn test_best_model_with_search_end_to_end() {
    let google = MockAdapter::replying(
        ProviderKind::Google,
        "Plants convert light into chemical energy [1], using chlorophyll [2].",
    );
    let dispatcher = Arc::new(dispatcher_with(vec![google.clone()]));
    let search = Arc::new(MockSearch {
        results: photosynthesis_sources(),
        calls: AtomicUsize::new(0),
    });
    let service = QueryService::new(dispatcher, Some(search.clone()));

    let answer = service
        .answer(&QueryRequest::new("How does photosynthesis work?"))
        .await
        .unwrap();

    assert!(answer.result.success);
    assert!(answer.result.content.as_deref().unwrap().contains("[1]"));
    assert_eq!(
        answer.result.model_used.as_ref().unwrap().provider_kind,
        ProviderKind::Google
    );
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);

    let messages = google.last_messages.lock().unwrap().clone();
    let system = &messages[0];
    assert!(system.content.contains("[1] Photosynthesis - Wikipedia"));
    assert!(system.content.contains("[2] How plants make food"));

    let html = answer.html.unwrap();
    assert!(html.contains(r#"href="https://en.wikipedia.org/wiki/Photosynthesis""#));
    assert!(html.contains(r#"href="https://example.edu/plants""#));
    assert!(!html.contains("[1]") && !html.contains("[2]"));
}

#[test]
fn test_out_of_range_citations_stay_plain_text() {
    let sources = photosynthesis_sources();
    let rendered = linkify_citations("Known [2], invented [3], zero [0].", &sources);
    assert!(rendered.contains("invented [3]"));
    assert!(rendered.contains("zero [0]"));
    assert!(rendered.contains("https://example.edu/plants"));
}

// ============================================================================
// Reasoning
// ============================================================================

#[tokio::test]
async fn test_reasoning_on_non_nvidia_model_makes_no_call() {
    let (google, nvidia, openrouter) = all_providers();
    let dispatcher = dispatcher_with(vec![google.clone(), nvidia.clone(), openrouter.clone()]);

    for selector in ["gemini-flash", "mistral-7b", "best"] {
        let result = dispatcher
            .generate_with_reasoning(selector, "why?", &[], &GenerationOptions::default())
            .await;
        assert!(!result.success, "{} should be rejected", selector);
        assert!(result.content.is_none());
        assert!(result.error.unwrap().starts_with("Reasoning is not supported"));
    }
    assert_eq!(google.calls() + nvidia.calls() + openrouter.calls(), 0);
}

#[tokio::test]
async fn test_reasoning_on_nvidia_returns_trace() {
    let nvidia = MockAdapter::replying(ProviderKind::Nvidia, "42");
    let dispatcher = dispatcher_with(vec![nvidia.clone()]);

    let result = dispatcher
        .generate_with_reasoning("nemotron-70b", "why?", &[], &GenerationOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(result.reasoning.as_deref(), Some("step by step"));
    assert_eq!(nvidia.calls(), 1);
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_connections_are_isolated() {
    let google = MockAdapter::new(
        ProviderKind::Google,
        Behavior::Fail(|| ProviderError::Upstream {
            provider: "Google".to_string(),
            status: 400,
            message: "API key not valid".to_string(),
        }),
    );
    let nvidia = MockAdapter::new(ProviderKind::Nvidia, Behavior::Panic);
    let openrouter = MockAdapter::replying(ProviderKind::OpenRouter, "Hello!");
    let dispatcher = dispatcher_with(vec![google.clone(), nvidia.clone(), openrouter.clone()]);

    let results = dispatcher.test_connections().await;

    assert_eq!(results.len(), 3);
    assert_eq!(results["Google"], false);
    assert_eq!(results["NVIDIA"], false);
    assert_eq!(results["OpenRouter"], true);
    assert_eq!((google.calls(), nvidia.calls(), openrouter.calls()), (1, 1, 1));
}

#[tokio::test]
async fn test_panicking_adapter_becomes_failure_result() {
    let google = MockAdapter::new(ProviderKind::Google, Behavior::Panic);
    let dispatcher = dispatcher_with(vec![google]);

    let result = dispatcher
        .generate_response("best", "hi", &[], &GenerationOptions::default())
        .await;

    assert!(!result.success);
    assert!(result.content.is_none());
    assert_eq!(result.error.as_deref(), Some("adapter exploded"));
}

#[tokio::test]
async fn test_malformed_options_still_yield_result() {
    let google = MockAdapter::replying(ProviderKind::Google, "fine");
    let dispatcher = dispatcher_with(vec![google]);
    let options: GenerationOptions = serde_json::from_value(json!({
        "maxTokens": -100,
        "temperature": "very",
        "topP": null
    }))
    .unwrap();

    let result = dispatcher.generate_response("best", "hi", &[], &options).await;

    assert!(result.success);
    assert_eq!(options.max_tokens, 2000);
}

// ============================================================================
// Real Adapters Against Mock Servers
// ============================================================================

#[tokio::test]
async fn test_missing_credentials_never_reach_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let settings = ProviderSettings::new(None, server.uri(), Duration::from_secs(5));
    let dispatcher = Dispatcher::new(Arc::new(ModelRegistry::default()))
        .with_adapter(Arc::new(GeminiAdapter::new(settings.clone()).unwrap()))
        .with_adapter(Arc::new(ChatCompletionsAdapter::nvidia(settings).unwrap()));

    let options = GenerationOptions::default();
    let google = dispatcher.generate_response("best", "hi", &[], &options).await;
    let nvidia = dispatcher
        .generate_response("nemotron-70b", "hi", &[], &options)
        .await;

    assert_eq!(google.error.as_deref(), Some("Google API key not found"));
    assert_eq!(nvidia.error.as_deref(), Some("NVIDIA API key not found"));
}

#[tokio::test]
async fn test_openrouter_round_trip_through_dispatcher() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer or-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "mistralai/mistral-7b-instruct:free",
            "choices": [{ "message": { "role": "assistant" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = ChatCompletionsAdapter::openrouter(
        ProviderSettings::new(
            Some("or-key".to_string()),
            server.uri(),
            Duration::from_secs(5),
        ),
        "http://localhost:3000",
        "Study Agent",
    )
    .unwrap();
    let dispatcher =
        Dispatcher::new(Arc::new(ModelRegistry::default())).with_adapter(Arc::new(adapter));

    let result = dispatcher
        .generate_response("mistral-7b", "hi", &[], &GenerationOptions::default())
        .await;

    assert!(result.success);
    assert_eq!(result.content.as_deref(), Some(NO_RESPONSE_PLACEHOLDER));
    assert_eq!(result.model_used.unwrap().id, "mistral-7b");
}
