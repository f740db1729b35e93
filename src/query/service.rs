// SPDX-License-Identifier: MIT

//! Query pipeline - search, then generate, then render citations

use super::search::WebSearch;
use crate::ai::chat::{ChatMessage, GenerationOptions, GenerationResult, SearchResult};
use crate::ai::citation::render_html;
use crate::ai::dispatcher::Dispatcher;
use crate::ai::error::QueryError;
use crate::ai::models::BEST_MODEL_ID;
use crate::ai::prompt::{PromptComposer, PromptMode};
use crate::ai::provider::CompletionStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_model() -> String {
    BEST_MODEL_ID.to_string()
}

fn default_web_search() -> bool {
    true
}

/// One user question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub mode: PromptMode,
    #[serde(default = "default_web_search")]
    pub web_search: bool,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: default_model(),
            mode: PromptMode::default(),
            web_search: true,
            history: Vec::new(),
            options: GenerationOptions::default(),
        }
    }
}

/// Generated answer with its sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnswer {
    pub result: GenerationResult,
    /// Sources in citation order: `[n]` refers to `sources[n - 1]`
    pub sources: Vec<SearchResult>,
    /// Escaped content with citation markers turned into links
    pub html: Option<String>,
}

/// Ties the web search collaborator to the dispatcher
#[derive(Clone)]
pub struct QueryService {
    dispatcher: Arc<Dispatcher>,
    search: Option<Arc<dyn WebSearch>>,
}

impl QueryService {
    pub fn new(dispatcher: Arc<Dispatcher>, search: Option<Arc<dyn WebSearch>>) -> Self {
        Self { dispatcher, search }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn search_backend(&self) -> Option<&Arc<dyn WebSearch>> {
        self.search.as_ref()
    }

    /// Answer a question, grounding it in web results when requested.
    ///
    /// A failed search fails the whole answer; generation failures come back
    /// inside `result`.
    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryAnswer, QueryError> {
        let query = Self::checked_query(request)?;
        let mut options = request.options.clone();
        options.mode = Some(request.mode);

        let (result, sources) = match self.sources_for(request, query).await? {
            Some(sources) => {
                let result = self
                    .dispatcher
                    .generate_response_with_search(
                        &request.model,
                        query,
                        &sources,
                        &request.history,
                        &options,
                    )
                    .await;
                (result, sources)
            }
            None => {
                if options.system_prompt.is_none() {
                    options.system_prompt =
                        Some(PromptComposer::base_prompt(request.mode).to_string());
                }
                let result = self
                    .dispatcher
                    .generate_response(&request.model, query, &request.history, &options)
                    .await;
                (result, Vec::new())
            }
        };

        let html = result
            .content
            .as_deref()
            .map(|content| render_html(content, &sources));

        Ok(QueryAnswer {
            result,
            sources,
            html,
        })
    }

    /// Streaming variant of [`answer`](Self::answer).
    ///
    /// Search runs to completion first; the sources are returned alongside
    /// the delta stream. Failing to open the stream is an error here.
    pub async fn answer_stream(&self, request: &QueryRequest) -> Result<AnswerStream, QueryError> {
        let query = Self::checked_query(request)?;
        let mut options = request.options.clone();
        options.mode = Some(request.mode);

        let sources = match self.sources_for(request, query).await? {
            Some(sources) => {
                options.system_prompt =
                    Some(PromptComposer::with_search_context(request.mode, &sources));
                sources
            }
            None => {
                if options.system_prompt.is_none() {
                    options.system_prompt =
                        Some(PromptComposer::base_prompt(request.mode).to_string());
                }
                Vec::new()
            }
        };

        let deltas = self
            .dispatcher
            .generate_stream(&request.model, query, &request.history, &options)
            .await?;
        Ok(AnswerStream { sources, deltas })
    }

    fn checked_query(request: &QueryRequest) -> Result<&str, QueryError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(QueryError::search("Search query is required"));
        }
        Ok(query)
    }

    /// `None` when the answer should not be grounded in search results
    async fn sources_for(
        &self,
        request: &QueryRequest,
        query: &str,
    ) -> Result<Option<Vec<SearchResult>>, QueryError> {
        if !request.web_search {
            return Ok(None);
        }
        match &self.search {
            Some(search) => Ok(Some(search.search(query).await?.results)),
            None => {
                log::warn!("Web search requested but no search backend is configured");
                Ok(None)
            }
        }
    }
}

/// Sources plus the live answer stream
pub struct AnswerStream {
    pub sources: Vec<SearchResult>,
    pub deltas: CompletionStream,
}
