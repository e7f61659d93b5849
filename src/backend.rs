//! The capability the chat session talks to.
//!
//! A [`ChatBackend`] turns an ordered conversation plus generation parameters into either
//! one complete text, or a single-pass stream of [`Fragment`]s.  [`crate::VllmClient`] is
//! the production implementation; tests provide scripted ones.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::chat::GenerationConfig;
use crate::error::{Error, Result};
use crate::types::{Turn, Usage};

/// Which kind of transport a backend uses.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain request/response; cannot stream.
    Buffered,

    /// Can additionally deliver responses as server-sent events.
    #[default]
    Streaming,
}

impl BackendKind {
    /// Whether backends of this kind can stream.
    pub fn supports_streaming(self) -> bool {
        matches!(self, BackendKind::Streaming)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Buffered => write!(f, "buffered"),
            BackendKind::Streaming => write!(f, "streaming"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    /// Accepts `buffered`/`requests` and `streaming`/`openai` (case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "buffered" | "requests" => Ok(BackendKind::Buffered),
            "streaming" | "openai" => Ok(BackendKind::Streaming),
            _ => Err(Error::validation(
                format!("unknown backend {s:?} (expected buffered or streaming)"),
                Some("backend".to_string()),
            )),
        }
    }
}

/// One item of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Newly generated text.
    Text(String),

    /// Token usage reported by the server, normally after the last text fragment.
    Usage(Usage),
}

/// A finite, single-pass, non-restartable stream of fragments.
///
/// Fragments yielded before an error have already been delivered; nothing is replayed.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// The complete result of a buffered request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// The generated text.
    pub text: String,

    /// Token usage, when the server reports it.
    pub usage: Option<Usage>,
}

impl Completion {
    /// Creates a completion without usage information.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    /// Attaches usage information.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A stateless chat-completions capability.
///
/// Every call receives the full conversation; no server-side session exists.  Both calls
/// fail with a transport error (see [`Error::is_transport`]) on network or protocol
/// failure, including mid-stream.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Whether [`ChatBackend::send_streaming`] is available.
    ///
    /// Callers check this before streaming instead of relying on an error.
    fn supports_streaming(&self) -> bool;

    /// Requests a complete response, blocking until it is available.
    async fn send(&self, messages: &[Turn], config: &GenerationConfig) -> Result<Completion>;

    /// Requests a response as a stream of fragments.
    async fn send_streaming(
        &self,
        messages: &[Turn],
        config: &GenerationConfig,
    ) -> Result<FragmentStream>;
}
