//! The conversation log and its on-disk snapshot form.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::backend::BackendKind;
use crate::chat::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::types::{Role, Turn, Usage};

/// The generation parameters recorded in a snapshot.
///
/// Every field is optional on read; absent fields keep the in-memory value when the
/// snapshot is loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Informational; the backend of a running session never changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl SnapshotConfig {
    /// Records every field of `config`.
    pub fn from_generation(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: Some(config.max_tokens()),
            temperature: Some(config.temperature()),
            top_p: Some(config.top_p()),
            stream: Some(config.stream()),
            backend: Some(config.backend().to_string()),
        }
    }

    /// Overlays the recorded fields on `base`.
    ///
    /// Out-of-range values make the snapshot malformed; `base` is not modified.
    pub fn apply(&self, base: &GenerationConfig) -> Result<GenerationConfig> {
        let mut config = *base;
        let malformed = |err: Error| Error::malformed_snapshot(err.to_string(), None);
        if let Some(max_tokens) = self.max_tokens {
            config.set_max_tokens(max_tokens).map_err(malformed)?;
        }
        if let Some(temperature) = self.temperature {
            config.set_temperature(temperature).map_err(malformed)?;
        }
        if let Some(top_p) = self.top_p {
            config.set_top_p(top_p).map_err(malformed)?;
        }
        if let Some(stream) = self.stream {
            config.set_stream(stream);
        }
        Ok(config)
    }
}

/// A point-in-time copy of a conversation, its token counter and its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// When the snapshot was taken.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,
    /// Generation parameters at the time of the snapshot.
    #[serde(default)]
    pub config: SnapshotConfig,
    /// The conversation, oldest turn first.
    pub messages: Vec<Turn>,
    /// The token counter.
    pub total_tokens: u64,
}

impl SessionSnapshot {
    /// Renders the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| {
            Error::serialization("failed to serialize snapshot", Some(Box::new(err)))
        })
    }

    /// Parses a snapshot, rejecting absent or mistyped fields.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::malformed_snapshot(err.to_string(), Some(Box::new(err))))
    }

    /// The backend recorded in the snapshot, if it names a known kind.
    pub fn backend(&self) -> Option<BackendKind> {
        self.config.backend.as_deref().and_then(|b| b.parse().ok())
    }
}

/// The ordered message log plus the token-usage counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationStore {
    turns: Vec<Turn>,
    total_tokens: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn.  Empty content is allowed.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
    }

    /// Empties the conversation and resets the token counter.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.total_tokens = 0;
    }

    /// Removes and returns the most recent turn.
    pub fn remove_last(&mut self) -> Result<Turn> {
        self.turns.pop().ok_or(Error::EmptyHistory)
    }

    /// Adds server-reported usage to the counter.
    pub fn record_usage(&mut self, usage: &Usage) {
        self.total_tokens = self.total_tokens.saturating_add(usage.total_tokens);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Captures the conversation, the counter and `config`.
    pub fn serialize(&self, config: &GenerationConfig) -> SessionSnapshot {
        SessionSnapshot {
            timestamp: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            config: SnapshotConfig::from_generation(config),
            messages: self.turns.clone(),
            total_tokens: self.total_tokens,
        }
    }

    /// Replaces the conversation and counter with those of `snapshot`.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) {
        self.turns = snapshot.messages.clone();
        self.total_tokens = snapshot.total_tokens;
    }

    /// Parses `text` and replaces the conversation and counter wholesale.
    ///
    /// On `MalformedSnapshot` the store is left untouched.
    pub fn deserialize(&mut self, text: &str) -> Result<SessionSnapshot> {
        let snapshot = SessionSnapshot::from_json(text)?;
        self.restore(&snapshot);
        Ok(snapshot)
    }
}
