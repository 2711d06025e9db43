//! Output rendering for chat sessions.
//!
//! This module provides the renderer trait every user-visible line flows through, a
//! plain-text implementation for terminals, and an in-memory implementation for callers
//! that want to inspect output instead of printing it.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::{Message, Role};

/// ANSI escape code for dim text (used for raw chunk echo).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for system messages and info).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for assistant messages).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for magenta text (used for function messages).
const ANSI_MAGENTA: &str = "\x1b[35m";

/// Trait for rendering session output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - In-memory capture for embedding and tests
pub trait Renderer: Send {
    /// Called before the first fragment of a response is printed.
    fn start_response(&mut self, model: &str) {
        _ = model;
    }

    /// Prints a fragment of generated text.  Must be visible immediately.
    fn print_text(&mut self, text: &str);

    /// Echoes raw protocol bytes in verbose mode.
    fn print_raw(&mut self, raw: &str);

    /// Prints a recoverable problem.
    fn print_warning(&mut self, warning: &str);

    /// Prints an error.
    fn print_error(&mut self, error: &str);

    /// Prints an informational line.
    fn print_info(&mut self, info: &str);

    /// Prints one entry of the message log with its position.
    fn print_message(&mut self, index: usize, message: &Message);

    /// Called after the last fragment of a response has been printed.
    fn finish_response(&mut self);

    /// Called when a response was cut short by the user.
    fn print_interrupted(&mut self) {
        self.print_warning("[interrupted]");
    }

    /// Returns true when the user asked to stop the current response.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Generated text goes to stdout and is flushed after every fragment.  Warnings and
/// errors go to stderr.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
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
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Creates a new PlainTextRenderer with specified color and interrupt flag.
    pub fn with_color_and_interrupt(use_color: bool, interrupted: Arc<AtomicBool>) -> Self {
        Self::with_color(use_color).with_interrupt(interrupted)
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{text}");
        self.line_start = text.ends_with('\n');
        self.flush();
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn role_color(role: Role) -> &'static str {
        match role {
            Role::User => ANSI_RESET,
            Role::Assistant => ANSI_GREEN,
            Role::System => ANSI_CYAN,
            Role::Function => ANSI_MAGENTA,
        }
    }

    fn break_line(&mut self) {
        if !self.line_start {
            println!();
            self.line_start = true;
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
        let painted = self.paint(ANSI_GREEN, text);
        self.write(&painted);
        self.line_start = text.ends_with('\n');
    }

    fn print_raw(&mut self, raw: &str) {
        self.break_line();
        let painted = self.paint(ANSI_DIM, raw);
        self.write(&painted);
        self.line_start = raw.ends_with('\n');
        self.break_line();
    }

    fn print_warning(&mut self, warning: &str) {
        self.break_line();
        eprintln!("{}", self.paint(ANSI_YELLOW, &format!("Warning: {warning}")));
    }

    fn print_error(&mut self, error: &str) {
        self.break_line();
        eprintln!("{}", self.paint(ANSI_RED, &format!("Error: {error}")));
    }

    fn print_info(&mut self, info: &str) {
        self.break_line();
        println!("{}", self.paint(ANSI_CYAN, info));
        self.flush();
    }

    fn print_message(&mut self, index: usize, message: &Message) {
        self.break_line();
        let header = format!("[{index}] {}", message.role());
        let header = match message.name() {
            Some(name) => format!("{header} ({name})"),
            None => header,
        };
        let color = Self::role_color(message.role());
        println!("{}: {}", self.paint(color, &header), message.content());
        self.flush();
    }

    fn finish_response(&mut self) {
        self.write("\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// One event recorded by [`CaptureRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// A fragment of generated text.
    Text(String),
    /// Raw protocol bytes.
    Raw(String),
    /// A warning.
    Warning(String),
    /// An error.
    Error(String),
    /// An informational line.
    Info(String),
    /// A message log entry.
    Message(usize, Message),
}

/// Renderer that records everything in memory.
#[derive(Debug, Default)]
pub struct CaptureRenderer {
    events: Vec<Rendered>,
    responses: usize,
    interrupt: bool,
}

impl CaptureRenderer {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes [`Renderer::should_interrupt`] report `interrupt`.
    pub fn interrupt(&mut self, interrupt: bool) {
        self.interrupt = interrupt;
    }

    /// Everything rendered so far, in order.
    pub fn events(&self) -> &[Rendered] {
        &self.events
    }

    /// The concatenation of every text fragment.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                Rendered::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every warning, in order.
    pub fn warnings(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Rendered::Warning(warning) => Some(warning.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of completed responses.
    pub fn responses(&self) -> usize {
        self.responses
    }
}

impl Renderer for CaptureRenderer {
    fn print_text(&mut self, text: &str) {
        self.events.push(Rendered::Text(text.to_string()));
    }

    fn print_raw(&mut self, raw: &str) {
        self.events.push(Rendered::Raw(raw.to_string()));
    }

    fn print_warning(&mut self, warning: &str) {
        self.events.push(Rendered::Warning(warning.to_string()));
    }

    fn print_error(&mut self, error: &str) {
        self.events.push(Rendered::Error(error.to_string()));
    }

    fn print_info(&mut self, info: &str) {
        self.events.push(Rendered::Info(info.to_string()));
    }

    fn print_message(&mut self, index: usize, message: &Message) {
        self.events.push(Rendered::Message(index, message.clone()));
    }

    fn finish_response(&mut self) {
        self.responses += 1;
    }

    fn should_interrupt(&self) -> bool {
        self.interrupt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.paint(ANSI_RED, "plain"), "plain");
    }

    #[test]
    fn interrupt_flag_is_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let renderer = PlainTextRenderer::with_color_and_interrupt(false, Arc::clone(&flag));
        assert!(!renderer.should_interrupt());
        flag.store(true, Ordering::Relaxed);
        assert!(renderer.should_interrupt());
    }

    #[test]
    fn capture_collects_text_and_warnings() {
        let mut renderer = CaptureRenderer::new();
        renderer.print_text("Hel");
        renderer.print_warning("careful");
        renderer.print_text("lo");
        renderer.finish_response();
        assert_eq!(renderer.text(), "Hello");
        assert_eq!(renderer.warnings(), vec!["careful"]);
        assert_eq!(renderer.responses(), 1);
    }
}
