//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction so the session and dispatcher
//! never write to the terminal directly.  The default implementation uses ANSI escape
//! codes to tell the speakers, notices and errors apart.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::{Role, Turn};

/// ANSI escape code for bold text.
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for informational notices).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for the assistant).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for blue text (used for the user).
const ANSI_BLUE: &str = "\x1b[94m";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Recording renderers in tests
pub trait Renderer: Send {
    /// Print a chunk of response text.
    ///
    /// This is called incrementally as fragments are streamed from the server, or once
    /// with the whole text for buffered responses.
    fn print_text(&mut self, text: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a warning.
    fn print_warning(&mut self, warning: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print one numbered turn of the conversation history.
    fn print_turn(&mut self, index: usize, turn: &Turn);

    /// Called before the first fragment of a response.
    fn start_response(&mut self);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Called when the response is interrupted by the user.
    fn print_interrupted(&mut self);

    /// Whether the user asked to stop the response in flight.
    ///
    /// Polled while a streamed response is in flight, including while it is stalled.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// This renderer outputs text directly to stdout (errors to stderr) with optional ANSI
/// escape codes.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    in_response: bool,
    interrupt: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            in_response: false,
            interrupt: None,
        }
    }

    /// Reports interrupts from `flag`, typically set by a Ctrl-C handler.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Whether ANSI styling is enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn end_response_line(&mut self) {
        if self.in_response {
            println!();
            self.in_response = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        self.end_response_line();
        println!("{}", self.paint(ANSI_CYAN, info));
    }

    fn print_warning(&mut self, warning: &str) {
        self.end_response_line();
        println!("{}", self.paint(ANSI_YELLOW, &format!("Warning: {warning}")));
    }

    fn print_error(&mut self, error: &str) {
        self.end_response_line();
        self.flush();
        eprintln!("{}", self.paint(ANSI_RED, &format!("Error: {error}")));
    }

    fn print_turn(&mut self, index: usize, turn: &Turn) {
        let (color, label) = match turn.role {
            Role::User => (ANSI_BLUE, "User"),
            Role::Assistant => (ANSI_GREEN, "Assistant"),
        };
        let header = if self.use_color {
            format!("{ANSI_BOLD}{color}[{index}] {label}:{ANSI_RESET}")
        } else {
            format!("[{index}] {label}:")
        };
        println!("{header}");
        for line in turn.content.lines() {
            println!("    {line}");
        }
    }

    fn start_response(&mut self) {
        let label = if self.use_color {
            format!("{ANSI_BOLD}{ANSI_GREEN}Assistant:{ANSI_RESET} ")
        } else {
            "Assistant: ".to_string()
        };
        print!("{label}");
        self.in_response = true;
        self.flush();
    }

    fn finish_response(&mut self) {
        self.end_response_line();
        println!();
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.in_response = false;
        println!("\n{}", self.paint(ANSI_YELLOW, "[interrupted]"));
        self.flush();
    }

    fn should_interrupt(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
