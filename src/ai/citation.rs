// SPDX-License-Identifier: MIT

//! Citation rendering - turns `[n]` markers in generated text into links to
//! the nth search result.
//!
//! Markers are matched purely textually; bracketed digits that are not
//! citations (array indices in code samples, for instance) are linked too
//! when they fall inside the result range.

use crate::ai::chat::SearchResult;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Literal pattern; compilation cannot fail
static CITATION_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([0-9]+)\]").unwrap());

/// Replace in-range `[n]` markers with citation anchors.
///
/// The anchor text writes the brackets as `&#91;`/`&#93;` so the output
/// contains no new marker. Out-of-range markers are left untouched.
pub fn linkify_citations(content: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return content.to_string();
    }

    CITATION_MARKER
        .replace_all(content, |caps: &Captures| {
            let marker = &caps[0];
            let index = caps[1].parse::<usize>().ok();
            match index.and_then(|n| n.checked_sub(1)).and_then(|i| results.get(i)) {
                Some(source) => format!(
                    r#"<a href="{}" target="_blank" rel="noopener noreferrer" class="citation-link" title="{}">&#91;{}&#93;</a>"#,
                    escape_html(&source.link),
                    escape_html(&source.title),
                    &caps[1]
                ),
                None => marker.to_string(),
            }
        })
        .into_owned()
}

/// Render generated text as HTML: the text is escaped, then citations are
/// linked. Escaping leaves `[n]` markers intact.
pub fn render_html(content: &str, results: &[SearchResult]) -> String {
    linkify_citations(&escape_html(content), results)
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
