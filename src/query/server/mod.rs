// SPDX-License-Identifier: MIT

//! HTTP API - JSON endpoints over the dispatcher and the query pipeline

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::config::Config;
use super::search::{GoogleSearchClient, WebSearch};
use super::service::{QueryRequest, QueryService};
use crate::ai::chat::{ChatMessage, GenerationOptions, GenerationResult, SearchResult};
use crate::ai::error::QueryError;
use crate::ai::models::{ModelRegistry, BEST_MODEL_ID};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: QueryService,
}

impl AppState {
    /// Wire the dispatcher and, when credentials exist, the search client
    pub fn from_config(config: &Config) -> Result<Self, QueryError> {
        let registry = Arc::new(ModelRegistry::default());
        let dispatcher = Arc::new(config.build_dispatcher(registry)?);
        let search: Option<Arc<dyn WebSearch>> = if config.search.is_configured() {
            Some(Arc::new(GoogleSearchClient::new(
                &config.search,
                config.timeout(),
            )?))
        } else {
            log::warn!("Google Search credentials not configured; web search disabled");
            None
        };
        Ok(Self {
            service: QueryService::new(dispatcher, search),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/models", get(list_models))
        .route("/api/connections", get(test_connections))
        .route("/api/chat", post(chat))
        .route("/api/chat/reasoning", post(chat_reasoning))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/search", post(search))
        .route("/api/query", post(query))
        .route("/api/query/stream", post(query_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: &Config) -> Result<(), QueryError> {
    let app = router(AppState::from_config(config)?);
    let addr = config.server_addr()?;
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn default_model() -> String {
    BEST_MODEL_ID.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default = "default_model")]
    pub model: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub options: GenerationOptions,
    #[serde(default)]
    pub search_results: Option<Vec<SearchResult>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

fn generation_response(result: GenerationResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

fn query_error_status(err: &QueryError) -> StatusCode {
    match err {
        QueryError::Search(_) | QueryError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.service.dispatcher().registry().all()))
}

async fn test_connections(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.service.dispatcher().test_connections().await))
}

async fn chat(State(state): State<AppState>, Json(payload): Json<ChatRequest>) -> Response {
    let dispatcher = state.service.dispatcher();
    let result = match payload.search_results.as_deref() {
        Some(results) if !results.is_empty() => {
            dispatcher
                .generate_response_with_search(
                    &payload.model,
                    &payload.message,
                    results,
                    &payload.history,
                    &payload.options,
                )
                .await
        }
        _ => {
            dispatcher
                .generate_response(
                    &payload.model,
                    &payload.message,
                    &payload.history,
                    &payload.options,
                )
                .await
        }
    };
    generation_response(result)
}

async fn chat_reasoning(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Response {
    let result = state
        .service
        .dispatcher()
        .generate_with_reasoning(
            &payload.model,
            &payload.message,
            &payload.history,
            &payload.options,
        )
        .await;
    generation_response(result)
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming chat with model: {}", payload.model);
        let stream = state
            .service
            .dispatcher()
            .generate_stream(
                &payload.model,
                &payload.message,
                &payload.history,
                &payload.options,
            )
            .await;

        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Streaming chat failed: {}", e);
                let _ = tx.send(Event::default().event("error").data(e.to_string())).await;
                return;
            }
        };

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(delta) => Event::default()
                    .json_data(&delta)
                    .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
                Err(e) => {
                    log::error!("Stream interrupted: {}", e);
                    let _ = tx.send(Event::default().event("error").data(e.to_string())).await;
                    return;
                }
            };
            if tx.send(event).await.is_err() {
                log::debug!("Client disconnected from stream");
                return;
            }
        }
        let _ = tx.send(Event::default().event("done").data("[DONE]")).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

async fn search(State(state): State<AppState>, Json(payload): Json<SearchRequest>) -> Response {
    if payload.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Search query is required");
    }
    let Some(backend) = state.service.search_backend() else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Google Search API credentials not configured",
        );
    };

    match backend.search(&payload.query).await {
        Ok(response) => {
            let count = response.results.len();
            Json(json!({
                "success": true,
                "query": response.query,
                "results": response.results,
                "searchInfo": {
                    "totalResults": response.total_results,
                    "searchTime": response.search_time,
                    "resultsCount": count
                },
                "timestamp": chrono::Utc::now()
            }))
            .into_response()
        }
        Err(e) => error_response(query_error_status(&e), e.to_string()),
    }
}

async fn query(State(state): State<AppState>, Json(payload): Json<QueryRequest>) -> Response {
    if payload.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Search query is required");
    }
    match state.service.answer(&payload).await {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => error_response(query_error_status(&e), e.to_string()),
    }
}

/// Sources first, then the answer deltas
async fn query_stream(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Response {
    if payload.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Search query is required");
    }
    let answer = match state.service.answer_stream(&payload).await {
        Ok(answer) => answer,
        Err(e) => {
            log::error!("Streaming query failed: {}", e);
            return error_response(query_error_status(&e), e.to_string());
        }
    };

    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(async move {
        let mut deltas = answer.deltas;
        let sources = Event::default()
            .event("sources")
            .json_data(&answer.sources)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        if tx.send(sources).await.is_err() {
            return;
        }

        while let Some(item) = deltas.next().await {
            let event = match item {
                Ok(delta) => Event::default()
                    .json_data(&delta)
                    .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
                Err(e) => {
                    log::error!("Stream interrupted: {}", e);
                    let _ = tx.send(Event::default().event("error").data(e.to_string())).await;
                    return;
                }
            };
            if tx.send(event).await.is_err() {
                log::debug!("Client disconnected from stream");
                return;
            }
        }
        let _ = tx.send(Event::default().event("done").data("[DONE]")).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
        .into_response()
}
