// SPDX-License-Identifier: MIT

//! Web search collaborator - Google Custom Search JSON API

use super::config::SearchConfig;
use crate::ai::chat::SearchResult;
use crate::ai::error::QueryError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Only the fields the pipeline reads
const RESPONSE_FIELDS: &str =
    "items(title,link,snippet,displayLink,formattedUrl),searchInformation(totalResults,searchTime)";

/// Search hits in rank order plus the engine's summary figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total_results: String,
    pub search_time: f64,
}

/// Anything that can turn a query into ranked results
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, QueryError>;
}

/// Google Custom Search client
pub struct GoogleSearchClient {
    client: Client,
    api_key: String,
    engine_id: String,
    base_url: String,
    num: u32,
}

impl GoogleSearchClient {
    /// Requires both the API key and the search engine id
    pub fn new(config: &SearchConfig, timeout: Duration) -> Result<Self, QueryError> {
        let (Some(api_key), Some(engine_id)) = (&config.api_key, &config.engine_id) else {
            return Err(QueryError::config(
                "Google Search API credentials not configured",
            ));
        };
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.clone(),
            engine_id: engine_id.clone(),
            base_url: config.base_url.clone(),
            num: config.num,
        })
    }

    fn parse_response(query: &str, body: &Value) -> Result<SearchResponse, QueryError> {
        let results: Vec<SearchResult> = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match SearchResult::deserialize(item) {
                        Ok(result) => Some(result),
                        Err(e) => {
                            log::warn!("Skipping malformed search result: {}", e);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let info = body.get("searchInformation");
        let total_results = info
            .and_then(|i| i.get("totalResults"))
            .and_then(Value::as_str)
            .unwrap_or("0")
            .to_string();
        let search_time = info
            .and_then(|i| i.get("searchTime"))
            .and_then(Value::as_f64)
            .unwrap_or_default();

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            total_results,
            search_time,
        })
    }
}

#[async_trait]
impl WebSearch for GoogleSearchClient {
    async fn search(&self, query: &str) -> Result<SearchResponse, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::search("Search query is required"));
        }

        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| QueryError::config(format!("invalid search base_url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("cx", &self.engine_id)
            .append_pair("q", query)
            .append_pair("num", &self.num.to_string())
            .append_pair("safe", "active")
            .append_pair("fields", RESPONSE_FIELDS);

        log::info!("Searching Google for: {}", query);

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let message = crate::ai::provider::error_message(&text)
                .unwrap_or_else(|| "Search request failed".to_string());
            log::error!("Google Search API error ({}): {}", status, message);
            return Err(QueryError::search(message));
        }

        let body: Value = resp.json().await?;
        let response = Self::parse_response(query, &body)?;
        log::info!("Found {} results for: {}", response.results.len(), query);
        Ok(response)
    }
}
