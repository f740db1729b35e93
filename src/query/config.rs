// SPDX-License-Identifier: MIT

//! Configuration - YAML file plus environment overrides
//!
//! Credentials are read from the config file or the environment at startup;
//! none are compiled in. A missing provider key surfaces as
//! `ProviderError::ApiKeyMissing` when that provider is first used.

use crate::ai::dispatcher::Dispatcher;
use crate::ai::error::QueryError;
use crate::ai::models::ModelRegistry;
use crate::ai::provider::{ChatCompletionsAdapter, GeminiAdapter, ProviderSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const NVIDIA_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const CUSTOM_SEARCH_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SEARCH_RESULTS: u32 = 10;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub providers: ProvidersConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout applied by every outbound HTTP client
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub google: ProviderConfig,
    pub nvidia: ProviderConfig,
    pub openrouter: OpenRouterConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            google: ProviderConfig::with_base_url(GOOGLE_BASE_URL),
            nvidia: ProviderConfig::with_base_url(NVIDIA_BASE_URL),
            openrouter: OpenRouterConfig::default(),
        }
    }
}

/// Credentials and endpoint for one provider.
///
/// A section that omits `base_url` gets the provider's public endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: String,
}

impl ProviderConfig {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    /// Sent as `HTTP-Referer`
    pub site_url: String,
    /// Sent as `X-Title`
    pub app_title: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENROUTER_BASE_URL.to_string(),
            site_url: "http://localhost:3000".to_string(),
            app_title: "Study Agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub engine_id: Option<String>,
    pub base_url: String,
    pub num: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            base_url: CUSTOM_SEARCH_BASE_URL.to_string(),
            num: DEFAULT_SEARCH_RESULTS,
        }
    }
}

impl SearchConfig {
    /// Both the key and the engine id are present
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.engine_id.is_some()
    }
}

impl Config {
    /// Load from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, QueryError> {
        let mut config = match path {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                let content = fs::read_to_string(path)?;
                Self::parse_yaml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, QueryError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a lookup function; empty values count as absent
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("GOOGLE_API_KEY") {
            self.providers.google.api_key = Some(v);
        }
        if let Some(v) = var("NVIDIA_API_KEY") {
            self.providers.nvidia.api_key = Some(v);
        }
        if let Some(v) = var("OPENROUTER_API_KEY") {
            self.providers.openrouter.api_key = Some(v);
        }
        if let Some(v) = var("GOOGLE_BASE_URL") {
            self.providers.google.base_url = v;
        }
        if let Some(v) = var("NVIDIA_BASE_URL") {
            self.providers.nvidia.base_url = v;
        }
        if let Some(v) = var("OPENROUTER_BASE_URL") {
            self.providers.openrouter.base_url = v;
        }
        if let Some(v) = var("QUERY_SITE_URL") {
            self.providers.openrouter.site_url = v;
        }
        if let Some(v) = var("GOOGLE_SEARCH_API_KEY") {
            self.search.api_key = Some(v);
        }
        if let Some(v) = var("GOOGLE_SEARCH_ENGINE_ID") {
            self.search.engine_id = Some(v);
        }
        if let Some(v) = var("QUERY_HTTP_TIMEOUT_SECS") {
            match v.parse() {
                Ok(secs) => self.http.timeout_secs = secs,
                Err(_) => log::warn!("Ignoring QUERY_HTTP_TIMEOUT_SECS={}, not a number", v),
            }
        }
        if let Some(v) = var("QUERY_PORT") {
            match v.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => log::warn!("Ignoring QUERY_PORT={}, not a port", v),
            }
        }
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.http.timeout_secs == 0 {
            return Err(QueryError::config("http.timeout_secs must be positive"));
        }
        if self.search.num == 0 || self.search.num > 10 {
            return Err(QueryError::config("search.num must be between 1 and 10"));
        }
        for (name, base) in [
            ("google", &self.providers.google.base_url),
            ("nvidia", &self.providers.nvidia.base_url),
            ("openrouter", &self.providers.openrouter.base_url),
            ("search", &self.search.base_url),
        ] {
            url::Url::parse(base).map_err(|e| {
                QueryError::config(format!("invalid {} base_url '{}': {}", name, base, e))
            })?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Address the HTTP server binds to
    pub fn server_addr(&self) -> Result<SocketAddr, QueryError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| QueryError::config(format!("invalid server address: {}", e)))
    }

    /// Build a dispatcher with all three provider adapters
    pub fn build_dispatcher(&self, registry: Arc<ModelRegistry>) -> Result<Dispatcher, QueryError> {
        let timeout = self.timeout();
        let google = &self.providers.google;
        let nvidia = &self.providers.nvidia;
        let openrouter = &self.providers.openrouter;

        for (label, key) in [
            ("Google", &google.api_key),
            ("NVIDIA", &nvidia.api_key),
            ("OpenRouter", &openrouter.api_key),
        ] {
            if key.is_none() {
                log::warn!("{} API key not configured; its models will fail", label);
            }
        }

        Ok(Dispatcher::new(registry)
            .with_adapter(Arc::new(GeminiAdapter::new(ProviderSettings::new(
                google.api_key.clone(),
                &google.base_url,
                timeout,
            ))?))
            .with_adapter(Arc::new(ChatCompletionsAdapter::nvidia(
                ProviderSettings::new(nvidia.api_key.clone(), &nvidia.base_url, timeout),
            )?))
            .with_adapter(Arc::new(ChatCompletionsAdapter::openrouter(
                ProviderSettings::new(openrouter.api_key.clone(), &openrouter.base_url, timeout),
                openrouter.site_url.clone(),
                openrouter.app_title.clone(),
            )?)))
    }

    fn normalize(&mut self) {
        for (base, default) in [
            (&mut self.providers.google.base_url, GOOGLE_BASE_URL),
            (&mut self.providers.nvidia.base_url, NVIDIA_BASE_URL),
            (&mut self.providers.openrouter.base_url, OPENROUTER_BASE_URL),
            (&mut self.search.base_url, CUSTOM_SEARCH_BASE_URL),
        ] {
            if base.trim().is_empty() {
                *base = default.to_string();
            }
        }

        for key in [
            &mut self.providers.google.api_key,
            &mut self.providers.nvidia.api_key,
            &mut self.providers.openrouter.api_key,
            &mut self.search.api_key,
            &mut self.search.engine_id,
        ] {
            if key.as_deref().is_some_and(|k| k.trim().is_empty()) {
                *key = None;
            }
        }
    }
}
