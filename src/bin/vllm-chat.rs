//! Interactive chat application for a vLLM inference server.
//!
//! This binary provides a REPL interface for chatting with a model served through vLLM's
//! OpenAI-compatible API, streaming or buffered.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage against http://localhost:9000
//! vllm-chat
//!
//! # Another server and model
//! vllm-chat --base-url http://gpu-box:8000 --model Qwen3-8B
//!
//! # Plain request/response backend, no colors
//! vllm-chat --backend buffered --no-color
//!
//! # Settings from a YAML file, overridden by flags
//! vllm-chat --config chat.yaml --temperature 0.2
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Clear conversation history
//! - `/save [name]`, `/load <name>`, `/list` - Manage saved chats
//! - `/config [key value]` - Show or change generation parameters
//! - `/stream` - Toggle streaming output
//! - `/quit` - Exit the application
//!
//! Set `RUST_LOG=vllm_chat=debug` to log requests and exchanges to stderr.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use vllm_chat::chat::{
    ChatArgs, ChatConfig, ChatSession, Flow, PlainTextRenderer, Renderer, dispatch,
};
use vllm_chat::{TracingLogger, VllmClient};

/// How often a buffered exchange checks for Ctrl-C.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Main entry point for the vllm-chat application.
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("vllm-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let mut renderer = PlainTextRenderer::with_color(config.use_color);

    let client = VllmClient::from_config(&config)?.with_logger(Arc::new(TracingLogger));
    renderer.print_info(&format!("Connecting to {} ...", client.base_url()));
    match client.list_models().await {
        Ok(models) => {
            if !models.iter().any(|m| m == client.model()) {
                renderer.print_warning(&format!(
                    "model {} is not served here (available: {})",
                    client.model(),
                    models.join(", ")
                ));
            }
        }
        Err(err) => {
            renderer.print_error(&format!("cannot reach the server: {err}"));
            renderer.print_info(&format!(
                "Check that:\n  1. the vLLM server is running\n  2. {} is the right address\n  3. the API key is correct (--api-key or $VLLM_API_KEY)",
                config.base_url
            ));
            return Ok(ExitCode::FAILURE);
        }
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    })?;
    let mut renderer = renderer.with_interrupt(interrupted.clone());

    let mut session = ChatSession::new(client, &config);
    let mut rl = DefaultEditor::new()?;

    renderer.print_info(&format!(
        "vLLM Chat (model: {}, backend: {}, streaming: {})",
        config.model,
        config.generation.backend(),
        if config.generation.stream() { "on" } else { "off" }
    ));
    renderer.print_info("Type /help for commands, /quit to exit\n");

    loop {
        interrupted.store(false, Ordering::SeqCst);

        match rl.readline("You: ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.trim());

                // Streaming exchanges watch the flag themselves, even while stalled.
                let streams = session.config().stream() && session.supports_streaming();
                let outcome = tokio::select! {
                    flow = dispatch(&mut session, &line, &mut renderer) => Some(flow),
                    _ = interrupt_requested(&interrupted), if !streams => None,
                };
                let flow = match outcome {
                    Some(flow) => flow,
                    None => {
                        renderer.print_interrupted();
                        match session.recover_interrupted() {
                            Ok(_) => {
                                renderer.print_warning("response abandoned; the question was not recorded");
                                Flow::Continue
                            }
                            Err(err) => {
                                renderer.print_error(&err.to_string());
                                Flow::Terminate
                            }
                        }
                    }
                };
                if flow == Flow::Terminate {
                    renderer.print_info("Goodbye!");
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                renderer.print_info("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    drop(session);
    renderer.print_info("Connection closed.");
    Ok(ExitCode::SUCCESS)
}

async fn interrupt_requested(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}
