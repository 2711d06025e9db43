//! Line-editor support: tab completion and inline hints for slash commands.

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

/// Every slash command with its argument synopsis.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/autosave", ""),
    ("/chat-del", " <id>"),
    ("/chat-list", ""),
    ("/chat-load", " <id>"),
    ("/chat-rename", " <id> <name>"),
    ("/exit", ""),
    ("/file", " <path> <prompt>"),
    ("/help", ""),
    ("/hist-clear", ""),
    ("/hist-del", " <idx>"),
    ("/hist-list", ""),
    ("/info", ""),
    ("/models", ""),
    ("/persist", ""),
    ("/save", ""),
    ("/set-max-tokens", " <n>"),
    ("/set-model", " <model_id>"),
    ("/set-n", " <n>"),
    ("/set-presence-pen", " <f>"),
    ("/set-stream", " <on|off>"),
    ("/set-temperature", " <f>"),
    ("/set-top_p", " <f>"),
    ("/set-verbose", " <on|off>"),
    ("/system", " <prompt>"),
];

/// rustyline helper that completes command names and hints their arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandHelper;

impl CommandHelper {
    fn matching(prefix: &str) -> impl Iterator<Item = &'static (&'static str, &'static str)> + '_ {
        COMMANDS.iter().filter(move |(name, _)| name.starts_with(prefix))
    }
}

impl Completer for CommandHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let typed = &line[..pos];
        if !typed.starts_with('/') || typed.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }
        let candidates = Self::matching(typed)
            .map(|(name, usage)| Pair {
                display: format!("{name}{usage}"),
                replacement: if usage.is_empty() {
                    name.to_string()
                } else {
                    format!("{name} ")
                },
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for CommandHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() || !line.starts_with('/') || line.len() < 2 {
            return None;
        }
        let mut found = Self::matching(line);
        let (name, usage) = found.next()?;
        // Only hint when the prefix is unambiguous.
        if found.next().is_some() && *name != line {
            return None;
        }
        let rest = format!("{name}{usage}");
        rest.get(line.len()..)
            .filter(|hint| !hint.is_empty())
            .map(String::from)
    }
}

impl Highlighter for CommandHelper {}

impl Validator for CommandHelper {}

impl Helper for CommandHelper {}
