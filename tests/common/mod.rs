//! Scripted backend and recording renderer shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream;

use vllm_chat::chat::{ChatConfig, ChatSession, GenerationConfig, Renderer};
use vllm_chat::{ChatBackend, Completion, Error, Fragment, FragmentStream, Result, Turn, Usage};

/// What the backend does for one call.
pub enum Reply {
    /// Yield these fragments, in order, then end.
    Fragments(Vec<Result<Fragment>>),
    /// Fail before producing anything.
    Fail(Error),
    /// Never answer.
    Pending,
}

impl Reply {
    pub fn text(parts: &[&str]) -> Self {
        Reply::Fragments(parts.iter().map(|p| Ok(Fragment::Text(p.to_string()))).collect())
    }

    pub fn text_with_usage(parts: &[&str], usage: Usage) -> Self {
        let mut fragments: Vec<Result<Fragment>> =
            parts.iter().map(|p| Ok(Fragment::Text(p.to_string()))).collect();
        fragments.push(Ok(Fragment::Usage(usage)));
        Reply::Fragments(fragments)
    }

    pub fn fail_after(parts: &[&str], err: Error) -> Self {
        let mut fragments: Vec<Result<Fragment>> =
            parts.iter().map(|p| Ok(Fragment::Text(p.to_string()))).collect();
        fragments.push(Err(err));
        Reply::Fragments(fragments)
    }
}

/// A backend that plays back scripted replies and records every conversation it is sent.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    streaming: bool,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl ScriptedBackend {
    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::default()
        }
    }

    pub fn buffered() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Every conversation sent so far.
    pub fn requests(&self) -> Vec<Vec<Turn>> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, messages: &[Turn]) -> Reply {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fragments(Vec::new()))
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn send(&self, messages: &[Turn], _: &GenerationConfig) -> Result<Completion> {
        match self.next(messages) {
            Reply::Fail(err) => Err(err),
            Reply::Pending => futures::future::pending().await,
            Reply::Fragments(fragments) => {
                let mut completion = Completion::default();
                for fragment in fragments {
                    match fragment? {
                        Fragment::Text(text) => completion.text.push_str(&text),
                        Fragment::Usage(usage) => completion.usage = Some(usage),
                    }
                }
                Ok(completion)
            }
        }
    }

    async fn send_streaming(
        &self,
        messages: &[Turn],
        _: &GenerationConfig,
    ) -> Result<FragmentStream> {
        assert!(self.streaming, "send_streaming called on a buffered backend");
        match self.next(messages) {
            Reply::Fail(err) => Err(err),
            Reply::Pending => Ok(Box::pin(stream::pending())),
            Reply::Fragments(fragments) => Ok(Box::pin(stream::iter(fragments))),
        }
    }
}

/// One thing the renderer was asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Text(String),
    Info(String),
    Warning(String),
    Error(String),
    Turn(usize, Turn),
    Interrupted,
}

/// A renderer that records everything instead of printing it.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub shown: Vec<Shown>,
    /// Set to ask the exchange in flight to stop.
    pub interrupt: Arc<AtomicBool>,
}

impl RecordingRenderer {
    /// All response text, concatenated.
    pub fn text(&self) -> String {
        self.shown
            .iter()
            .filter_map(|s| match s {
                Shown::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<&str> {
        self.filter(|s| match s {
            Shown::Info(m) => Some(m),
            _ => None,
        })
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.filter(|s| match s {
            Shown::Warning(m) => Some(m),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<&str> {
        self.filter(|s| match s {
            Shown::Error(m) => Some(m),
            _ => None,
        })
    }

    fn filter<'a>(&'a self, f: impl Fn(&'a Shown) -> Option<&'a String>) -> Vec<&'a str> {
        self.shown.iter().filter_map(f).map(String::as_str).collect()
    }
}

impl Renderer for RecordingRenderer {
    fn print_text(&mut self, text: &str) {
        self.shown.push(Shown::Text(text.to_string()));
    }

    fn print_info(&mut self, info: &str) {
        self.shown.push(Shown::Info(info.to_string()));
    }

    fn print_warning(&mut self, warning: &str) {
        self.shown.push(Shown::Warning(warning.to_string()));
    }

    fn print_error(&mut self, error: &str) {
        self.shown.push(Shown::Error(error.to_string()));
    }

    fn print_turn(&mut self, index: usize, turn: &Turn) {
        self.shown.push(Shown::Turn(index, turn.clone()));
    }

    fn start_response(&mut self) {}

    fn finish_response(&mut self) {}

    fn print_interrupted(&mut self) {
        self.shown.push(Shown::Interrupted);
    }

    fn should_interrupt(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

/// A session over `backend` whose history directory is `dir`.
pub fn session_in(
    backend: ScriptedBackend,
    dir: &std::path::Path,
) -> ChatSession<ScriptedBackend> {
    let config = ChatConfig::new().with_history_dir(dir);
    ChatSession::new(backend, &config)
}
