//! Logging trait for inference-server client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log all API interactions passing through the [`VllmClient`](crate::VllmClient).

use crate::{ChatCompletion, ChatCompletionChunk, ChatCompletionParams};

/// A trait for logging client operations.
///
/// Implement this trait to capture and record all API interactions,
/// including both buffered responses and individual streaming chunks.
///
/// # Example
///
/// ```rust,ignore
/// use vllm_chat::{ChatCompletion, ChatCompletionChunk, ChatCompletionParams, ClientLogger};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_request(&self, params: &ChatCompletionParams) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(params).unwrap()).unwrap();
///     }
///
///     fn log_response(&self, completion: &ChatCompletion) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Response: {}", serde_json::to_string(completion).unwrap()).unwrap();
///     }
///
///     fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Chunk: {}", serde_json::to_string(chunk).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log the parameters of an outgoing chat-completions request.
    fn log_request(&self, params: &ChatCompletionParams);

    /// Log a complete response from a buffered `send` call.
    fn log_response(&self, completion: &ChatCompletion);

    /// Log an individual streaming chunk.
    ///
    /// This method is called for each chunk received during a streaming request, in
    /// arrival order, including the trailing usage chunk.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);
}

/// A [`ClientLogger`] that forwards everything to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ClientLogger for TracingLogger {
    fn log_request(&self, params: &ChatCompletionParams) {
        tracing::debug!(
            model = %params.model,
            messages = params.messages.len(),
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            top_p = params.top_p,
            stream = params.stream,
            "chat completion request"
        );
    }

    fn log_response(&self, completion: &ChatCompletion) {
        tracing::debug!(
            id = completion.id.as_deref().unwrap_or(""),
            choices = completion.choices.len(),
            total_tokens = completion.usage.map(|u| u.total_tokens).unwrap_or(0),
            "chat completion response"
        );
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        tracing::trace!(
            id = chunk.id.as_deref().unwrap_or(""),
            text = chunk.text().unwrap_or(""),
            usage = chunk.usage.is_some(),
            "chat completion chunk"
        );
    }
}
