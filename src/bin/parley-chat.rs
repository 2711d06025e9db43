//! Interactive chat application for OpenAI-style chat completion APIs.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! parley-chat
//!
//! # Stream answers from a specific model and keep every exchange
//! parley-chat --model gpt-4 --stream --persist
//!
//! # Start from a YAML configuration file
//! parley-chat --config parley.yaml
//!
//! # Disable colors (useful for piping output)
//! parley-chat --no-color
//! ```
//!
//! The API key is read from `OPENAI_API_KEY`, or from a `.env` file in the
//! working directory.  Type `/help` at the prompt for the command list.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use tracing_subscriber::EnvFilter;

use parley::chat::{ChatArgs, ChatCommand, CommandHelper, file_prompt, help_text, parse_command};
use parley::{Credentials, Error, OpenAi, PlainTextRenderer, Renderer, Session};

const HISTORY_FILE: &str = "history.txt";

/// Main entry point for the parley-chat application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("parley-chat [OPTIONS]");
    init_tracing(args.verbose);

    let config = args.session_config()?;
    let mut credentials = Credentials::from_env()?;
    if let Some(organization) = &args.organization {
        credentials = credentials.with_organization(organization.clone());
    }

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut renderer = PlainTextRenderer::with_color_and_interrupt(args.use_color(), interrupted.clone());
    let mut session = Session::connect(credentials, config)?;

    if session.config().flags.persist() {
        if let Err(err) = session.enable_persistence() {
            renderer.print_error(&err.to_string());
            std::process::exit(1);
        }
    }

    let mut rl: Editor<CommandHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(CommandHelper));
    let _ = rl.load_history(HISTORY_FILE);

    println!("parley (model: {})", session.config().model);
    println!("Type /help for commands, /exit to exit\n");

    loop {
        interrupted.store(false, Ordering::Relaxed);

        match rl.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let outcome = match parse_command(line) {
                    Some(ChatCommand::Exit) => {
                        break;
                    }
                    Some(cmd) => run_command(&mut session, &mut renderer, cmd).await,
                    None => session.send(line, &mut renderer).await.map(|_| ()),
                };
                if let Err(err) = outcome {
                    report(&mut renderer, &err);
                    if err.is_store() && session.config().flags.persist() {
                        std::process::exit(1);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at the prompt is ignored.
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(HISTORY_FILE) {
        tracing::debug!("cannot save {HISTORY_FILE}: {err}");
    }
    println!("Goodbye!");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "parley=debug" } else { "parley=error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(renderer: &mut PlainTextRenderer, err: &Error) {
    // The renderer already marked the response as interrupted.
    if !err.is_abort() {
        renderer.print_error(&err.to_string());
    }
}

async fn run_command(
    session: &mut Session<OpenAi>,
    renderer: &mut PlainTextRenderer,
    cmd: ChatCommand,
) -> parley::Result<()> {
    match cmd {
        ChatCommand::Save => {
            let saved = session.save_history()?;
            renderer.print_info(&format!(
                "saved {saved} messages to chat {}",
                session.chat_id().unwrap_or_default()
            ));
        }
        ChatCommand::AutoSave => {
            let saved = session.autosave()?;
            renderer.print_info(&format!(
                "saved {saved} messages; saving every exchange to chat {}",
                session.chat_id().unwrap_or_default()
            ));
        }
        ChatCommand::Persist => {
            let chat = session.enable_persistence()?;
            renderer.print_info(&format!("saving every exchange to chat {chat}"));
        }
        ChatCommand::Models => {
            for model in session.list_models().await? {
                renderer.print_info(&model.id);
            }
        }
        ChatCommand::Info => {
            for line in session.info().to_string().lines() {
                renderer.print_info(line);
            }
        }
        ChatCommand::System(prompt) => {
            session.inject_system(&prompt)?;
        }
        ChatCommand::File { path, prompt } => {
            let contents = std::fs::read_to_string(&path)
                .map_err(|err| Error::io(format!("cannot read {path}"), err))?;
            session
                .send(&file_prompt(&prompt, &contents), renderer)
                .await?;
        }
        ChatCommand::HistList => {
            renderer.print_info(&format!("messages: {}", session.history().len()));
            session.render_history(renderer);
        }
        ChatCommand::HistDel(index) => match session.delete_history_entry(index) {
            Some(_) => renderer.print_info(&format!("deleted message {index}")),
            None => renderer.print_warning(&format!("no message at position {index}")),
        },
        ChatCommand::HistClear => {
            session.clear_history();
            renderer.print_info("history cleared");
        }
        ChatCommand::ChatList => {
            for chat in session.list_chats()? {
                let created = chat
                    .created
                    .map(|created| created.to_string())
                    .unwrap_or_default();
                renderer.print_info(&format!(
                    "{}: {} [{}] {}",
                    chat.id,
                    chat.name.as_deref().unwrap_or("(unnamed)"),
                    chat.model.as_deref().unwrap_or("?"),
                    created
                ));
            }
        }
        ChatCommand::ChatLoad(id) => {
            let count = session.load_chat(id)?;
            renderer.print_info(&format!("loaded chat {id} ({count} messages)"));
        }
        ChatCommand::ChatDel(id) => {
            if session.delete_chat(id)? {
                renderer.print_info(&format!("deleted chat {id}"));
            } else {
                renderer.print_warning(&format!("no chat with id {id}"));
            }
        }
        ChatCommand::ChatRename { id, name } => {
            if session.rename_chat(id, &name)? {
                renderer.print_info(&format!("chat {id} is now {name}"));
            } else {
                renderer.print_warning(&format!("no chat with id {id}"));
            }
        }
        ChatCommand::SetModel(model) => {
            renderer.print_info(&format!("model set to {model}"));
            session.config_mut().model = model;
        }
        ChatCommand::SetVerbose(on) => {
            session.config_mut().flags.set_verbose(on);
        }
        ChatCommand::SetStream(on) => {
            session.config_mut().flags.set_stream(on);
        }
        ChatCommand::SetTemperature(value) => {
            session.config_mut().sampling.temperature = value;
        }
        ChatCommand::SetTopP(value) => {
            session.config_mut().sampling.top_p = value;
        }
        ChatCommand::SetPresencePenalty(value) => {
            session.config_mut().sampling.presence_penalty = value;
        }
        ChatCommand::SetMaxTokens(value) => {
            session.config_mut().sampling.max_tokens = value;
        }
        ChatCommand::SetN(value) => {
            session.config_mut().sampling.n = value;
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::Exit => {}
        ChatCommand::Invalid(message) => {
            renderer.print_error(&message);
        }
    }
    Ok(())
}
