// SPDX-License-Identifier: MIT

//! AI core - model registry, prompt composition, provider adapters,
//! dispatcher and citation rendering

pub mod chat;
pub mod citation;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod prompt;
pub mod provider;

pub use chat::{ChatMessage, GenerationOptions, GenerationResult, Role, SearchResult, StreamDelta};
pub use citation::{linkify_citations, render_html};
pub use dispatcher::Dispatcher;
pub use error::{ProviderError, QueryError};
pub use models::{ModelDescriptor, ModelRegistry, ProviderKind};
pub use prompt::{PromptComposer, PromptMode};
pub use provider::{ProviderAdapter, ProviderSettings};
