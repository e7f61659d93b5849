use serde::{Deserialize, Serialize};

/// Token usage reported by the inference server.
///
/// vLLM reports usage on buffered responses, and on the final chunk of a stream when the
/// request asks for it with `stream_options.include_usage`.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// The number of prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,

    /// The number of generated tokens.
    #[serde(default)]
    pub completion_tokens: u64,

    /// Prompt plus generated tokens.
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// Create a new `Usage` with the given prompt and completion tokens.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
