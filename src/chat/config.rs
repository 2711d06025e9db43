//! Command-line arguments for the chat application.
//!
//! Arguments are parsed via `arrrg`.  They are layered over an optional YAML
//! configuration file: values given on the command line win.

use arrrg_derive::CommandLine;

use crate::config::{SessionConfig, check_range};
use crate::error::{Error, Result};

/// Command-line arguments for the parley-chat tool.
#[derive(CommandLine, Debug, Default, Eq, PartialEq)]
pub struct ChatArgs {
    /// YAML configuration file to start from.
    #[arrrg(optional, "YAML configuration file", "PATH")]
    pub config: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-3.5-turbo)", "MODEL")]
    pub model: Option<String>,

    /// Organization sent with every request.
    #[arrrg(optional, "OpenAI organization id", "ORG")]
    pub organization: Option<String>,

    #[arrrg(optional, "Sampling temperature, 0.0-2.0", "FLOAT")]
    pub temperature: Option<String>,

    #[arrrg(optional, "Nucleus sampling, 0.0-1.0", "FLOAT")]
    pub top_p: Option<String>,

    #[arrrg(optional, "Presence penalty, -2.0-2.0", "FLOAT")]
    pub presence_penalty: Option<String>,

    #[arrrg(optional, "Number of completions", "N")]
    pub n: Option<u32>,

    #[arrrg(optional, "Max tokens per response", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Path of the chat database.
    #[arrrg(optional, "Chat database (default: chat-hist.db)", "PATH")]
    pub database: Option<String>,

    /// API base URL, for proxies and compatible servers.
    #[arrrg(optional, "API base URL", "URL")]
    pub base_url: Option<String>,

    #[arrrg(flag, "Stream responses as they are generated")]
    pub stream: bool,

    #[arrrg(flag, "Echo requests and raw stream data")]
    pub verbose: bool,

    #[arrrg(flag, "Save every exchange to the chat database")]
    pub persist: bool,

    #[arrrg(flag, "Send each prompt without prior messages")]
    pub no_history: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

impl ChatArgs {
    /// Whether output should be styled.
    pub fn use_color(&self) -> bool {
        !self.no_color
    }

    /// Resolves the session configuration: the config file (or defaults), then the
    /// command-line overrides.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::new(),
        };

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(temperature) = &self.temperature {
            config.sampling.temperature = parse_knob("temperature", temperature, 0.0, 2.0)?;
        }
        if let Some(top_p) = &self.top_p {
            config.sampling.top_p = parse_knob("top-p", top_p, 0.0, 1.0)?;
        }
        if let Some(presence_penalty) = &self.presence_penalty {
            config.sampling.presence_penalty =
                parse_knob("presence-penalty", presence_penalty, -2.0, 2.0)?;
        }
        if let Some(n) = self.n {
            config.sampling.n = n;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.sampling.max_tokens = max_tokens;
        }
        if let Some(database) = &self.database {
            config.database = database.into();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }

        if self.stream {
            config.flags.set_stream(true);
        }
        if self.verbose {
            config.flags.set_verbose(true);
        }
        if self.persist {
            config.flags.set_persist(true);
        }
        if self.no_history {
            config.flags.set_history(false);
        }
        Ok(config)
    }
}

fn parse_knob(name: &str, value: &str, min: f32, max: f32) -> Result<f32> {
    let parsed = value.trim().parse::<f32>().map_err(|_| {
        Error::configuration(format!("--{name} expects a number, got {value:?}"))
    })?;
    check_range(&format!("--{name}"), parsed, min, max)
}
