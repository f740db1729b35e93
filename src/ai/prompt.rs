// SPDX-License-Identifier: MIT

//! Prompt composer - system prompts per interaction mode, optionally
//! grounded in numbered web search results.

use crate::ai::chat::SearchResult;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Instruction used when the caller supplies no system prompt at all
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI study assistant. Provide clear, accurate, and educational responses to help users learn effectively.";

const SEARCH_PROMPT: &str = "You are a helpful AI study assistant focused on learning and research. Provide clear, accurate, and educational responses. When possible, break down complex topics into understandable parts and suggest related topics for further study.";

const RESEARCH_PROMPT: &str = "You are an AI research assistant specializing in deep academic study. Provide comprehensive, well-structured responses with detailed explanations. Include relevant examples, cite important concepts, and suggest areas for deeper investigation.";

const GENERAL_PROMPT: &str =
    "You are a helpful AI assistant. Provide accurate, helpful, and informative responses to user queries.";

const SEARCH_CONTEXT_HEADER: &str = "You have been given the following web search results for the user's query. Each result is numbered.";

const SEARCH_GUIDELINES: &str = "When answering:
- Cite the results you rely on inline with their bracketed number, for example [n] where n is the result number.
- Synthesize information across multiple results instead of summarizing them one by one.
- If the results do not contain enough information to answer fully, say so explicitly.
- If results contradict each other, point out the conflict and cite each side.";

/// Label after which the user's query follows
pub const USER_QUERY_LABEL: &str = "User query:";

/// Interaction mode selecting the base instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    Search,
    Research,
    General,
}

impl PromptMode {
    /// Parse a mode name; unknown names mean `General`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "search" => Self::Search,
            "research" => Self::Research,
            _ => Self::General,
        }
    }
}

/// Builds system prompts for the dispatcher
pub struct PromptComposer;

impl PromptComposer {
    /// Fixed instruction for a mode
    pub fn base_prompt(mode: PromptMode) -> &'static str {
        match mode {
            PromptMode::Search => SEARCH_PROMPT,
            PromptMode::Research => RESEARCH_PROMPT,
            PromptMode::General => GENERAL_PROMPT,
        }
    }

    /// Mode instruction grounded in search results.
    ///
    /// Result `n` (1-based, input order) is rendered as `[n]`; the same
    /// numbering is what `linkify_citations` resolves later.
    pub fn with_search_context(mode: PromptMode, results: &[SearchResult]) -> String {
        let base = Self::base_prompt(mode);
        if results.is_empty() {
            return base.to_string();
        }

        let mut prompt = String::with_capacity(1024);
        prompt.push_str(SEARCH_CONTEXT_HEADER);
        prompt.push_str("\n\n");
        prompt.push_str(&Self::format_results(results));
        prompt.push_str("\n\n");
        prompt.push_str(SEARCH_GUIDELINES);
        prompt.push_str("\n\n");
        prompt.push_str(base);
        prompt.push_str("\n\n");
        prompt.push_str(USER_QUERY_LABEL);
        prompt
    }

    fn format_results(results: &[SearchResult]) -> String {
        let mut out = String::new();
        for (i, result) in results.iter().enumerate() {
            if i > 0 {
                out.push_str("\n\n");
            }
            // Writing into a String cannot fail
            let _ = write!(
                out,
                "[{}] {}\n{}\nSource: {}",
                i + 1,
                result.title,
                result.snippet,
                result.link
            );
        }
        out
    }
}
