// SPDX-License-Identifier: MIT

//! Server-sent-events payloads for streaming provider responses

use crate::ai::error::ProviderError;
use crate::ai::models::ProviderKind;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::future;
use futures::stream::{Stream, StreamExt};

const DONE_SENTINEL: &str = "[DONE]";

/// Decode a byte stream into event `data` payloads, ending at `[DONE]` or EOF
pub(crate) fn data_events<S, B>(
    kind: ProviderKind,
    bytes: S,
) -> impl Stream<Item = Result<String, ProviderError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    bytes
        .eventsource()
        .take_while(|event| {
            let done = matches!(event, Ok(e) if e.data.trim() == DONE_SENTINEL);
            future::ready(!done)
        })
        .filter_map(move |event| {
            future::ready(match event {
                Ok(e) if e.data.is_empty() => None,
                Ok(e) => Some(Ok(e.data)),
                Err(err) => Some(Err(stream_error(kind, err))),
            })
        })
}

fn stream_error(kind: ProviderKind, err: EventStreamError<reqwest::Error>) -> ProviderError {
    match err {
        EventStreamError::Transport(e) => ProviderError::transport(kind.label(), e),
        other => ProviderError::invalid_response(kind.label(), other.to_string()),
    }
}
