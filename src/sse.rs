//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! vLLM's OpenAI-compatible server streams one `chat.completion.chunk` JSON object per
//! `data:` event and ends the stream with `data: [DONE]`.  This module turns the raw byte
//! stream of such a response into a stream of parsed chunks.

use std::str::Utf8Error;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::{ChatCompletionChunk, Error, Result};

/// Marker the server sends as the data of its final event.
const DONE_MARKER: &str = "[DONE]";

/// One event extracted from the buffer.
#[derive(Debug)]
enum SseEvent {
    /// A parsed chunk, or the error parsing it.
    Chunk(Result<ChatCompletionChunk>),
    /// The terminating `[DONE]` event.
    Done,
    /// An event with no data (comments, keep-alives).
    Skip,
}

/// Process a stream of bytes into a stream of chat completion chunks.
///
/// The returned stream ends after the `[DONE]` event.  If the byte stream ends without
/// one, the response was cut short and the final item is a streaming error.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer = String::new();
    let pending = Vec::new();

    stream::unfold(
        (stream, buffer, pending, false),
        move |(mut stream, mut buffer, mut pending, finished)| async move {
            if finished {
                return None;
            }
            loop {
                // First check if we have a complete event in the buffer
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match event {
                        SseEvent::Chunk(chunk) => {
                            return Some((chunk, (stream, buffer, pending, false)));
                        }
                        SseEvent::Done => return None,
                        SseEvent::Skip => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        match decode_utf8_prefix(&mut pending) {
                            Ok(text) => buffer.push_str(&text.replace('\r', "")),
                            Err(e) => {
                                return Some((
                                    Err(Error::encoding(
                                        format!("Invalid UTF-8 in stream: {e}"),
                                        Some(Box::new(e)),
                                    )),
                                    (stream, buffer, pending, true),
                                ));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, pending, true)));
                    }
                    None => {
                        // The last event may lack its blank-line terminator.
                        if !buffer.trim().is_empty() {
                            buffer.push_str("\n\n");
                            continue;
                        }
                        return Some((
                            Err(Error::streaming(
                                "stream ended before the [DONE] marker",
                                None,
                            )),
                            (stream, buffer, pending, true),
                        ));
                    }
                }
            }
        },
    )
}

/// Decode the longest valid UTF-8 prefix of `pending`, leaving an incomplete trailing
/// character in place for the next network chunk.
fn decode_utf8_prefix(pending: &mut Vec<u8>) -> std::result::Result<String, Utf8Error> {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            Ok(text)
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            Ok(text)
        }
        Err(e) => Err(e),
    }
}

/// Extract a complete SSE event from a buffer string.
///
/// Events are delimited by a blank line.  Multiple `data:` lines of one event are joined
/// with newlines; `event:`, `id:`, `retry:` and comment lines are ignored.
fn extract_event(buffer: &str) -> Option<(SseEvent, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let data: Vec<&str> = event_text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if data.is_empty() {
        return Some((SseEvent::Skip, rest));
    }
    let data = data.join("\n");
    if data.trim() == DONE_MARKER {
        return Some((SseEvent::Done, rest));
    }
    Some((SseEvent::Chunk(parse_chunk(&data)), rest))
}

/// Parse the data of one event, surfacing in-band error objects as API errors.
fn parse_chunk(data: &str) -> Result<ChatCompletionChunk> {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        code: Option<u16>,
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        let detail = envelope.error;
        return Err(Error::api(
            detail.code.unwrap_or(500),
            detail.error_type.or_else(|| Some("stream_error".to_string())),
            detail.message.unwrap_or_else(|| data.to_string()),
        ));
    }
    serde_json::from_str::<ChatCompletionChunk>(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })
}
