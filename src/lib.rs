//! A terminal chat client for vLLM's OpenAI-compatible server.
//!
//! The library is split into a transport layer ([`VllmClient`] behind the [`ChatBackend`]
//! trait) and the [`chat`] module, which holds the conversation, runs exchanges and
//! dispatches slash commands.

// Public modules
pub mod backend;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod observability;
pub mod sse;
pub mod types;
pub mod utils;

// Re-exports
pub use backend::{BackendKind, ChatBackend, Completion, Fragment, FragmentStream};
pub use client::VllmClient;
pub use client_logger::{ClientLogger, TracingLogger};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use types::*;
