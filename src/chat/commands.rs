//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the server.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Clear the conversation history and token counter.
    Clear,

    /// Show the conversation history.
    History,

    /// Save the conversation, to an automatically named slot when `None`.
    Save(Option<String>),

    /// Load a saved conversation.
    Load(String),

    /// List saved conversations.
    List,

    /// Show the current configuration.
    ShowConfig,

    /// Set one configuration value.
    SetConfig {
        /// The configuration key, as typed.
        key: String,
        /// The raw value, parsed by the configuration.
        value: String,
    },

    /// Toggle streaming output.
    Stream,

    /// Display session statistics (message count, tokens, model, endpoint).
    Stats,

    /// A known command used incorrectly; carries the usage notice.
    Invalid(String),

    /// A directive that does not exist.
    Unknown(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be treated
/// as a regular message.  The directive is everything up to the first run of whitespace,
/// compared case-insensitively; the argument is the trimmed remainder.
///
/// # Examples
///
/// ```
/// # use vllm_chat::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("/config max_tokens 1000").is_some());
/// assert!(parse_command("What is hypertension?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let body = input.strip_prefix('/')?;

    let (command, argument) = match body.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (body, ""),
    };
    let command = command.to_lowercase();
    let argument = Some(argument).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "clear" => ChatCommand::Clear,
        "history" => ChatCommand::History,
        "save" => ChatCommand::Save(argument.map(|s| s.to_string())),
        "load" => match argument {
            Some(name) => ChatCommand::Load(name.to_string()),
            None => ChatCommand::Invalid("Usage: /load <name>".to_string()),
        },
        "list" => ChatCommand::List,
        "config" => parse_config_command(argument),
        "stream" => ChatCommand::Stream,
        "stats" => ChatCommand::Stats,
        _ => ChatCommand::Unknown(command),
    };

    Some(result)
}

fn parse_config_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::ShowConfig;
    };
    match arg.split_once(char::is_whitespace) {
        Some((key, value)) => ChatCommand::SetConfig {
            key: key.to_string(),
            value: value.trim().to_string(),
        },
        None => ChatCommand::Invalid("Usage: /config <key> <value>".to_string()),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /help                  Show this help message
  /quit, /exit, /q       Exit the chat
  /clear                 Clear conversation history
  /history               Show the full conversation history

Saved chats:
  /save [name]           Save the conversation (default: chat_YYYYMMDD_HHMMSS.json)
  /load <name>           Load a saved conversation
  /list                  List saved conversations (most recent first)

Configuration:
  /config                Show current configuration
  /config <key> <value>  Change a generation parameter
  /stream                Toggle streaming output
  /stats                 Show session statistics

Configurable keys:
  max_tokens             Maximum tokens per response (default: 512)
  temperature            Sampling temperature 0-2 (default: 0.7)
  top_p                  Top-p sampling, greater than 0 and at most 1 (default: 0.95)
  stream                 Streaming output on/off (default: on)

Examples:
  /config max_tokens 1000
  /config temperature 0.5
  /save my_chat.json
  /load my_chat.json

Anything not starting with / is sent to the model.  Press Ctrl-C to stop a response."#
}
