use serde::{Deserialize, Serialize};

use crate::types::Turn;

/// Options that only apply to streaming requests.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamOptions {
    /// Ask the server to send a final chunk carrying token usage.
    pub include_usage: bool,
}

/// Request body for `POST /v1/chat/completions`.
///
/// Only the subset of the OpenAI parameter surface that the chat client adjusts is modelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionParams {
    /// The served model name.
    pub model: String,

    /// The full conversation, oldest turn first.
    pub messages: Vec<Turn>,

    /// Maximum number of tokens to generate.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling probability mass.
    pub top_p: f32,

    /// Whether the server should respond with server-sent events.
    pub stream: bool,

    /// Streaming options, only sent when `stream` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

impl ChatCompletionParams {
    /// Create buffered request parameters.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Turn>,
        max_tokens: u32,
        temperature: f32,
        top_p: f32,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            temperature,
            top_p,
            stream: false,
            stream_options: None,
        }
    }

    /// Switch these parameters to a streaming request that reports usage at the end.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self.stream_options = Some(StreamOptions {
            include_usage: true,
        });
        self
    }
}
