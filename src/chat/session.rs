//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation, the
//! generation parameters, the backend and the history directory, and runs one exchange at
//! a time against the backend.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures::StreamExt;

use crate::backend::{ChatBackend, Fragment};
use crate::chat::config::{ChatConfig, GenerationConfig};
use crate::chat::history::{SlotInfo, SnapshotDir};
use crate::chat::render::Renderer;
use crate::chat::store::{ConversationStore, SessionSnapshot};
use crate::error::{Error, Result};
use crate::observability::{
    EXCHANGE_COMMITS, EXCHANGE_DURATION, EXCHANGE_ROLLBACKS, EXCHANGES, SNAPSHOT_LOAD_ERRORS,
    SNAPSHOT_LOADS, SNAPSHOT_SAVES,
};
use crate::types::{Role, Turn};

/// How often a streaming exchange checks for an interrupt while no fragment arrives.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Where the session is in the exchange cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    Idle,
    /// The user turn has been appended; the conversation held `previous_len` turns before.
    AwaitingResponse { previous_len: usize },
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The number of turns in the conversation.
    pub message_count: usize,
    /// Tokens reported by the server since the last clear.
    pub total_tokens: u64,
    /// The served model name.
    pub model: String,
    /// The server the session talks to.
    pub endpoint: String,
    /// The active generation parameters.
    pub config: GenerationConfig,
}

/// A chat session that manages conversation state and backend interactions.
pub struct ChatSession<B: ChatBackend> {
    backend: B,
    store: ConversationStore,
    config: GenerationConfig,
    snapshots: SnapshotDir,
    state: ExchangeState,
    model: String,
    endpoint: String,
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a new chat session with the given backend and configuration.
    pub fn new(backend: B, config: &ChatConfig) -> Self {
        Self {
            backend,
            store: ConversationStore::new(),
            config: config.generation,
            snapshots: SnapshotDir::new(config.history_dir.clone()),
            state: ExchangeState::Idle,
            model: config.model.clone(),
            endpoint: config.base_url.clone(),
        }
    }

    /// Sends one user turn and records the reply.
    ///
    /// When streaming is enabled and the backend can stream, fragments are passed to the
    /// renderer as they arrive; otherwise the complete text is rendered once it is
    /// available.
    ///
    /// On success the conversation has grown by the user turn and the assistant turn.  On
    /// failure the user turn is removed again and the cause is returned wrapped in
    /// [`Error::Backend`]; fragments already rendered stay on screen but are not recorded.
    pub async fn exchange(&mut self, user_text: &str, renderer: &mut dyn Renderer) -> Result<String> {
        self.recover_interrupted()?;

        EXCHANGES.click();
        let start = Instant::now();
        let previous_len = self.store.len();
        self.store.append(Role::User, user_text);
        self.state = ExchangeState::AwaitingResponse { previous_len };
        tracing::debug!(turns = self.store.len(), stream = self.config.stream(), "exchange started");

        let result = if self.config.stream() && self.backend.supports_streaming() {
            self.streamed_response(renderer).await
        } else {
            self.buffered_response(renderer).await
        };
        EXCHANGE_DURATION.add(start.elapsed().as_secs_f64());

        match result {
            Ok(text) => {
                self.store.append(Role::Assistant, text.clone());
                self.state = ExchangeState::Idle;
                EXCHANGE_COMMITS.click();
                tracing::debug!(turns = self.store.len(), "exchange committed");
                Ok(text)
            }
            Err(err) => {
                tracing::warn!(error = %err, "exchange failed; rolling back");
                self.roll_back()?;
                Err(Error::backend(err))
            }
        }
    }

    async fn streamed_response(&mut self, renderer: &mut dyn Renderer) -> Result<String> {
        let mut stream = {
            let request = self
                .backend
                .send_streaming(self.store.turns(), &self.config);
            tokio::pin!(request);
            loop {
                if renderer.should_interrupt() {
                    renderer.print_interrupted();
                    return Err(Error::abort("request interrupted"));
                }
                tokio::select! {
                    result = &mut request => break result?,
                    _ = tokio::time::sleep(INTERRUPT_POLL) => {}
                }
            }
        };
        renderer.start_response();
        let mut text = String::new();
        loop {
            if renderer.should_interrupt() {
                renderer.print_interrupted();
                return Err(Error::abort("response interrupted"));
            }
            // A stalled server must not hide an interrupt; `next` is cancel-safe.
            let next = tokio::select! {
                next = stream.next() => next,
                _ = tokio::time::sleep(INTERRUPT_POLL) => continue,
            };
            let Some(fragment) = next else {
                break;
            };
            match fragment {
                Ok(Fragment::Text(fragment)) => {
                    renderer.print_text(&fragment);
                    text.push_str(&fragment);
                }
                Ok(Fragment::Usage(usage)) => self.store.record_usage(&usage),
                Err(err) => {
                    renderer.finish_response();
                    return Err(err);
                }
            }
        }
        renderer.finish_response();
        Ok(text)
    }

    async fn buffered_response(&mut self, renderer: &mut dyn Renderer) -> Result<String> {
        let completion = self.backend.send(self.store.turns(), &self.config).await?;
        if let Some(usage) = &completion.usage {
            self.store.record_usage(usage);
        }
        renderer.start_response();
        renderer.print_text(&completion.text);
        renderer.finish_response();
        Ok(completion.text)
    }

    /// Rolls back an exchange that never completed, e.g. because its future was dropped.
    ///
    /// Returns whether anything was rolled back.
    pub fn recover_interrupted(&mut self) -> Result<bool> {
        match self.state {
            ExchangeState::Idle => Ok(false),
            ExchangeState::AwaitingResponse { .. } => {
                tracing::warn!("rolling back an interrupted exchange");
                self.roll_back()?;
                Ok(true)
            }
        }
    }

    fn roll_back(&mut self) -> Result<()> {
        let ExchangeState::AwaitingResponse { previous_len } = self.state else {
            return Ok(());
        };
        self.state = ExchangeState::Idle;
        while self.store.len() > previous_len {
            self.store.remove_last()?;
        }
        EXCHANGE_ROLLBACKS.click();
        Ok(())
    }

    /// The conversation, oldest turn first.
    pub fn history(&self) -> &[Turn] {
        self.store.turns()
    }

    /// Returns the number of turns in the conversation.
    pub fn message_count(&self) -> usize {
        self.store.len()
    }

    /// Tokens reported by the server since the last clear.
    pub fn total_tokens(&self) -> u64 {
        self.store.total_tokens()
    }

    /// Clears the conversation history and the token counter.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// The active generation parameters.
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Whether the backend can stream at all.
    pub fn supports_streaming(&self) -> bool {
        self.backend.supports_streaming()
    }

    /// Parses and applies `/config <key> <value>`; the config is unchanged on error.
    pub fn set_config_value(&mut self, key: &str, value: &str) -> Result<()> {
        self.config.set(key, value)?;
        tracing::debug!(key, value, "config updated");
        Ok(())
    }

    /// Flips streaming output and returns the new value.
    pub fn toggle_stream(&mut self) -> bool {
        self.config.toggle_stream()
    }

    /// The history directory.
    pub fn snapshots(&self) -> &SnapshotDir {
        &self.snapshots
    }

    /// Saves the conversation to the named slot, or to a timestamped one.
    ///
    /// Returns `None` without writing anything when the conversation is empty.
    pub fn save(&self, name: Option<&str>) -> Result<Option<PathBuf>> {
        if self.store.is_empty() {
            return Ok(None);
        }
        let snapshot = self.store.serialize(&self.config);
        let name = match name {
            Some(name) => SnapshotDir::slot_name(name)?,
            None => SnapshotDir::auto_name(snapshot.timestamp),
        };
        let path = self.snapshots.write(&name, &snapshot.to_json()?)?;
        SNAPSHOT_SAVES.click();
        tracing::debug!(path = %path.display(), turns = snapshot.messages.len(), "chat saved");
        Ok(Some(path))
    }

    /// Replaces the conversation, counter and recorded config with a saved slot.
    ///
    /// Loading is all-or-nothing: on any error the session is unchanged.  Returns the
    /// number of turns loaded.
    pub fn load(&mut self, name: &str) -> Result<usize> {
        match self.load_inner(name) {
            Ok(count) => {
                SNAPSHOT_LOADS.click();
                Ok(count)
            }
            Err(err) => {
                SNAPSHOT_LOAD_ERRORS.click();
                tracing::warn!(name, error = %err, "failed to load chat");
                Err(err)
            }
        }
    }

    fn load_inner(&mut self, name: &str) -> Result<usize> {
        let text = self.snapshots.read(name)?;
        let snapshot = SessionSnapshot::from_json(&text)?;
        let config = snapshot.config.apply(&self.config)?;
        if let Some(recorded) = snapshot.backend()
            && recorded != self.config.backend()
        {
            tracing::debug!(%recorded, current = %self.config.backend(), "ignoring recorded backend");
        }
        self.store.restore(&snapshot);
        self.config = config;
        self.state = ExchangeState::Idle;
        Ok(snapshot.messages.len())
    }

    /// Saved chats, most recent first.
    pub fn list_snapshots(&self) -> Result<Vec<SlotInfo>> {
        self.snapshots.list()
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            message_count: self.store.len(),
            total_tokens: self.store.total_tokens(),
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            config: self.config,
        }
    }
}
