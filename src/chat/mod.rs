//! Chat application module for interactive conversations with a vLLM server.
//!
//! This module provides a REPL chat interface built on top of the client library. It
//! supports:
//!
//! - Streaming responses with real-time token display
//! - Buffered responses for backends that cannot stream
//! - Slash commands for session control
//! - Saving and restoring conversations
//! - Runtime-adjustable generation parameters
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`store`]: The conversation log and its snapshot format
//! - [`history`]: The directory of saved chats
//! - [`session`]: Core chat session management and the exchange cycle
//! - [`commands`]: Slash command parsing
//! - [`dispatch`]: Routing input to commands or exchanges
//! - [`render`]: Terminal output

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod history;
pub mod render;
pub mod session;
pub mod store;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ChatConfigFile, ConfigKey, GenerationConfig};
pub use dispatch::{Flow, dispatch};
pub use history::{SlotInfo, SnapshotDir};
pub use render::{PlainTextRenderer, Renderer};
pub use session::{ChatSession, SessionStats};
pub use store::{ConversationStore, SessionSnapshot, SnapshotConfig};
