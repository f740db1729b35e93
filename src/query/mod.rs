// SPDX-License-Identifier: MIT

//! Query application - configuration, web search, the query pipeline and
//! the HTTP server

pub mod config;
pub mod search;
pub mod server;
pub mod service;

pub use config::Config;
pub use search::{GoogleSearchClient, SearchResponse, WebSearch};
pub use service::{QueryAnswer, QueryRequest, QueryService};
