//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the session without sending messages
//! to the API.

/// A parsed chat command.
///
/// These commands control the session and are not sent to the API.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Save the message log to the current chat, creating one if needed.
    Save,

    /// Save now and persist every following exchange.
    AutoSave,

    /// Persist every following exchange in a new chat.
    Persist,

    /// List the available models.
    Models,

    /// Show the current settings.
    Info,

    /// Inject a system message into the log.
    System(String),

    /// Ask about the contents of a file.
    File { path: String, prompt: String },

    /// Print the message log.
    HistList,

    /// Delete one entry of the message log by position.
    HistDel(usize),

    /// Empty the message log.  Stored chats are not touched.
    HistClear,

    /// List stored chats.
    ChatList,

    /// Replace the message log with a stored chat.
    ChatLoad(i64),

    /// Delete a stored chat.
    ChatDel(i64),

    /// Rename a stored chat.
    ChatRename { id: i64, name: String },

    /// Change the model.
    SetModel(String),

    /// Toggle verbose output.
    SetVerbose(bool),

    /// Toggle streaming.
    SetStream(bool),

    /// Set the sampling temperature (0 restores the server default).
    SetTemperature(f32),

    /// Set the top-p value (0 restores the server default).
    SetTopP(f32),

    /// Set the presence penalty (0 restores the server default).
    SetPresencePenalty(f32),

    /// Set the maximum tokens per response (0 restores the server default).
    SetMaxTokens(u32),

    /// Set the number of completions (0 restores the server default).
    SetN(u32),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Exit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be sent as a regular message.
///
/// # Examples
///
/// ```
/// # use parley::chat::parse_command;
/// assert!(parse_command("/exit").is_some());
/// assert!(parse_command("/set-model gpt-4").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "save" => ChatCommand::Save,
        "autosave" => ChatCommand::AutoSave,
        "persist" => ChatCommand::Persist,
        "models" => ChatCommand::Models,
        "info" => ChatCommand::Info,
        "help" | "?" => ChatCommand::Help,
        "exit" | "quit" => ChatCommand::Exit,
        "system" => match argument {
            Some(prompt) => ChatCommand::System(prompt.to_string()),
            None => ChatCommand::Invalid("Usage: /system <prompt>".to_string()),
        },
        "file" => parse_file_command(argument),
        "hist-list" => ChatCommand::HistList,
        "hist-clear" => ChatCommand::HistClear,
        "hist-del" => match argument.map(str::parse::<usize>) {
            Some(Ok(index)) => ChatCommand::HistDel(index),
            _ => ChatCommand::Invalid("Usage: /hist-del <msg_idx>".to_string()),
        },
        "chat-list" => ChatCommand::ChatList,
        "chat-load" => parse_id_command(argument, ChatCommand::ChatLoad, "/chat-load"),
        "chat-del" => parse_id_command(argument, ChatCommand::ChatDel, "/chat-del"),
        "chat-rename" => parse_rename_command(argument),
        "set-model" => match argument {
            Some(model) => ChatCommand::SetModel(model.to_string()),
            None => ChatCommand::Invalid("Usage: /set-model <model_id>".to_string()),
        },
        "set-verbose" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::SetVerbose(value),
            None => ChatCommand::Invalid("Usage: /set-verbose <on|off>".to_string()),
        },
        "set-stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::SetStream(value),
            None => ChatCommand::Invalid("Usage: /set-stream <on|off>".to_string()),
        },
        "set-temperature" => parse_f32_command(
            argument,
            ChatCommand::SetTemperature,
            "/set-temperature",
            0.0,
            2.0,
        ),
        "set-top_p" => parse_f32_command(argument, ChatCommand::SetTopP, "/set-top_p", 0.0, 1.0),
        "set-presence-pen" => parse_f32_command(
            argument,
            ChatCommand::SetPresencePenalty,
            "/set-presence-pen",
            -2.0,
            2.0,
        ),
        "set-max-tokens" => parse_u32_command(argument, ChatCommand::SetMaxTokens, "/set-max-tokens"),
        "set-n" => parse_u32_command(argument, ChatCommand::SetN, "/set-n"),
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_file_command(argument: Option<&str>) -> ChatCommand {
    let usage = || ChatCommand::Invalid("Usage: /file <file_path> <prompt>".to_string());
    let Some(arg) = argument else {
        return usage();
    };
    let mut parts = arg.splitn(2, char::is_whitespace);
    let path = parts.next().unwrap_or_default();
    let Some(prompt) = parts.next().map(str::trim).filter(|s| !s.is_empty()) else {
        return usage();
    };
    ChatCommand::File {
        path: path.to_string(),
        prompt: prompt.to_string(),
    }
}

fn parse_rename_command(argument: Option<&str>) -> ChatCommand {
    let usage = || ChatCommand::Invalid("Usage: /chat-rename <id> <name>".to_string());
    let Some(arg) = argument else {
        return usage();
    };
    let mut parts = arg.splitn(2, char::is_whitespace);
    let Ok(id) = parts.next().unwrap_or_default().parse::<i64>() else {
        return ChatCommand::Invalid("/chat-rename failed to parse id as an integer".to_string());
    };
    match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => ChatCommand::ChatRename {
            id,
            name: name.to_string(),
        },
        None => usage(),
    }
}

fn parse_id_command<F>(argument: Option<&str>, constructor: F, name: &str) -> ChatCommand
where
    F: Fn(i64) -> ChatCommand,
{
    match argument.map(str::parse::<i64>) {
        Some(Ok(id)) if id > 0 => constructor(id),
        _ => ChatCommand::Invalid(format!("Usage: {name} <chat_id>")),
    }
}

fn parse_u32_command<F>(argument: Option<&str>, constructor: F, name: &str) -> ChatCommand
where
    F: Fn(u32) -> ChatCommand,
{
    match argument {
        Some(arg) => match arg.parse::<u32>() {
            Ok(value) => constructor(value),
            Err(_) => ChatCommand::Invalid(format!("{} expects a non-negative integer", name)),
        },
        None => ChatCommand::Invalid(format!("{} requires a value", name)),
    }
}

fn parse_f32_command<F>(
    argument: Option<&str>,
    constructor: F,
    name: &str,
    min: f32,
    max: f32,
) -> ChatCommand
where
    F: Fn(f32) -> ChatCommand,
{
    match argument {
        Some(arg) => match parse_f32_in_range(arg, min, max) {
            Ok(value) => constructor(value),
            Err(err) => ChatCommand::Invalid(format!("{name} {err}")),
        },
        None => ChatCommand::Invalid(format!("{name} requires a value")),
    }
}

fn parse_f32_in_range(value: &str, min: f32, max: f32) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Builds the message sent for `/file`: the prompt followed by the file in a code fence.
pub fn file_prompt(prompt: &str, contents: &str) -> String {
    format!("{prompt} : \n ```\n{contents}\n```")
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Commands:
  /save                     Save the current chat to the database
  /autosave                 Save now and keep saving every exchange
  /persist                  Start a new chat and save every exchange
  /models                   List the models available to you
  /info                     Show the current settings
  /system <prompt>          Inject a system message
  /file <path> <prompt>     Ask about the contents of a file
  /hist-list                Show the message history
  /hist-del <idx>           Delete one message from memory
  /hist-clear               Clear the history in memory (not the database)
  /chat-list                List chats saved in the database
  /chat-load <id>           Load a saved chat
  /chat-del <id>            Delete a saved chat
  /chat-rename <id> <name>  Rename a saved chat
  /help                     Show this help message
  /exit                     Exit (persisted exchanges are already saved)

Settings (0 restores the server default):
  /set-model <model_id>     Change the model
  /set-verbose <on|off>     Echo requests and raw stream data
  /set-stream <on|off>      Stream responses as they are generated
  /set-temperature <f>      Sampling temperature, 0.0-2.0
  /set-top_p <f>            Nucleus sampling, 0.0-1.0
  /set-presence-pen <f>     Presence penalty, -2.0-2.0
  /set-max-tokens <n>       Maximum tokens per response
  /set-n <n>                Number of completions"#
}
