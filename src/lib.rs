// SPDX-License-Identifier: MIT

//! query-rs - multi-provider AI dispatcher with web-search grounding
//!
//! - [ai] - provider-neutral core: registry, prompts, adapters, dispatcher
//! - [query] - application around the core: config, search, pipeline, server

pub mod ai;
pub mod query;
