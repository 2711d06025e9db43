//! Interactive chat front end built on [`crate::Session`].
//!
//! - [`config`]: CLI argument parsing layered over the YAML configuration
//! - [`commands`]: slash command parsing and help
//! - [`completion`]: tab completion and hints for the line editor

mod commands;
mod completion;
mod config;

pub use commands::{ChatCommand, file_prompt, help_text, parse_command};
pub use completion::{COMMANDS, CommandHelper};
pub use config::ChatArgs;
