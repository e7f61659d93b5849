//! Routes one line of user input to a command handler or to an exchange.

use crate::backend::ChatBackend;
use crate::chat::commands::{ChatCommand, help_text, parse_command};
use crate::chat::render::Renderer;
use crate::chat::session::ChatSession;
use crate::error::Error;

/// Whether the REPL keeps going after a line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Handles one line of input.
///
/// Blank lines are ignored, lines starting with `/` are commands, and everything else is
/// sent to the model.  Failures are reported through the renderer; only errors that leave
/// the session untrustworthy terminate the loop.
pub async fn dispatch<B: ChatBackend>(
    session: &mut ChatSession<B>,
    line: &str,
    renderer: &mut dyn Renderer,
) -> Flow {
    let line = line.trim();
    if line.is_empty() {
        return Flow::Continue;
    }
    let Some(command) = parse_command(line) else {
        return match session.exchange(line, renderer).await {
            Ok(_) => Flow::Continue,
            Err(err) if err.is_abort() => Flow::Continue,
            Err(err) => report(renderer, &err),
        };
    };
    tracing::debug!(?command, "command");
    handle_command(session, command, renderer)
}

fn handle_command<B: ChatBackend>(
    session: &mut ChatSession<B>,
    command: ChatCommand,
    renderer: &mut dyn Renderer,
) -> Flow {
    match command {
        ChatCommand::Help => renderer.print_info(help_text()),
        ChatCommand::Quit => return Flow::Terminate,
        ChatCommand::Clear => {
            session.clear();
            renderer.print_info("Conversation history cleared.");
        }
        ChatCommand::History => {
            if session.history().is_empty() {
                renderer.print_info("No conversation history yet.");
            } else {
                for (index, turn) in session.history().iter().enumerate() {
                    renderer.print_turn(index + 1, turn);
                }
            }
        }
        ChatCommand::Save(name) => match session.save(name.as_deref()) {
            Ok(Some(path)) => {
                renderer.print_info(&format!("Conversation saved to {}", path.display()));
            }
            Ok(None) => renderer.print_warning("No conversation to save."),
            Err(err) => return report(renderer, &err),
        },
        ChatCommand::Load(name) => match session.load(&name) {
            Ok(count) => renderer.print_info(&format!("Loaded {count} messages from {name}.")),
            Err(err) => return report(renderer, &err),
        },
        ChatCommand::List => match session.list_snapshots() {
            Ok(slots) if slots.is_empty() => renderer.print_info("No saved chats found."),
            Ok(slots) => {
                let mut listing = String::from("Saved chats:");
                for (index, slot) in slots.iter().enumerate() {
                    listing.push_str(&format!(
                        "\n  {}. {} ({} bytes, {})",
                        index + 1,
                        slot.name,
                        slot.size,
                        slot.modified_display()
                    ));
                }
                renderer.print_info(&listing);
            }
            Err(err) => return report(renderer, &err),
        },
        ChatCommand::ShowConfig => {
            let mut listing = String::from("Current configuration:");
            for (key, value) in session.config().entries() {
                listing.push_str(&format!("\n  {:<15} = {value}", key.as_str()));
            }
            renderer.print_info(&listing);
        }
        ChatCommand::SetConfig { key, value } => match session.set_config_value(&key, &value) {
            Ok(()) => {
                let current = session
                    .config()
                    .entries()
                    .into_iter()
                    .find(|(k, _)| k.as_str() == key)
                    .map(|(_, v)| v)
                    .unwrap_or(value);
                renderer.print_info(&format!("Updated {key} = {current}"));
            }
            Err(err) => return report(renderer, &err),
        },
        ChatCommand::Stream => {
            let enabled = session.toggle_stream();
            renderer.print_info(&format!(
                "Streaming output {}.",
                if enabled { "enabled" } else { "disabled" }
            ));
            if enabled && !session.supports_streaming() {
                renderer.print_warning(&format!(
                    "the {} backend cannot stream; responses will arrive in one piece",
                    session.config().backend()
                ));
            }
        }
        ChatCommand::Stats => {
            let stats = session.stats();
            renderer.print_info(&format!(
                "Session statistics:\n  messages     = {}\n  total_tokens = {}\n  model        = {}\n  endpoint     = {}",
                stats.message_count, stats.total_tokens, stats.model, stats.endpoint
            ));
        }
        ChatCommand::Invalid(usage) => renderer.print_warning(&usage),
        ChatCommand::Unknown(directive) => {
            renderer.print_error(&Error::unknown_directive(directive).to_string());
            renderer.print_info("Type /help for the list of commands.");
        }
    }
    Flow::Continue
}

fn report(renderer: &mut dyn Renderer, err: &Error) -> Flow {
    renderer.print_error(&err.to_string());
    if err.is_fatal() {
        tracing::error!(error = %err, "session state is inconsistent; stopping");
        Flow::Terminate
    } else {
        Flow::Continue
    }
}
