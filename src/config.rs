//! Session configuration: credentials, model, sampling knobs and feature flags.
//!
//! Configuration can be built in code, loaded from a YAML file, or assembled from the
//! command line by [`crate::chat::ChatArgs`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// SQLite database used for chat history when nothing else is configured.
pub const DEFAULT_DATABASE: &str = "chat-hist.db";

const API_KEY_VAR: &str = "OPENAI_API_KEY";
const ORGANIZATION_VAR: &str = "OPENAI_ORGANIZATION";

/// API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token sent on every request.
    pub api_key: String,
    /// Organization the key belongs to, sent as `OpenAI-Organization`.
    pub organization: Option<String>,
}

impl Credentials {
    /// Creates credentials from an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            organization: None,
        }
    }

    /// Sets the organization id.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Reads credentials from the environment.
    ///
    /// The key comes from `OPENAI_API_KEY`, falling back to a `.env` file in the current
    /// directory.  The organization comes from `OPENAI_ORGANIZATION`.
    pub fn from_env() -> Result<Self> {
        let api_key = match env::var(API_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => Self::key_from_env_file(".env")?,
        };
        let organization = env::var(ORGANIZATION_VAR)
            .ok()
            .filter(|org| !org.trim().is_empty());
        Ok(Self {
            api_key,
            organization,
        })
    }

    /// Reads the API key from a dotenv-style file.
    pub fn key_from_env_file<P: AsRef<Path>>(path: P) -> Result<String> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|_| {
            Error::configuration(format!(
                "{API_KEY_VAR} is not set and {} could not be read",
                path.display()
            ))
        })?;
        parse_env_file(&content).ok_or_else(|| {
            Error::configuration(format!("{} does not contain an API key", path.display()))
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("organization", &self.organization)
            .finish()
    }
}

/// Accepts either `OPENAI_API_KEY=...` lines or a file holding nothing but the key.
fn parse_env_file(content: &str) -> Option<String> {
    let mut bare = None;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        match line.split_once('=') {
            Some((name, value)) if name.trim() == API_KEY_VAR => {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
            Some(_) => {}
            None => {
                if bare.is_none() {
                    bare = Some(line.to_string());
                }
            }
        }
    }
    bare
}

/// Sampling knobs sent with each request.
///
/// Zero means "unset": a zero-valued knob is left out of the request and the server
/// default applies.  As a consequence an explicit zero (say `temperature: 0.0`) cannot be
/// requested; it is indistinguishable from leaving the knob alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Sampling temperature, 0.0 to 2.0.
    pub temperature: f32,
    /// Nucleus sampling mass, 0.0 to 1.0.
    pub top_p: f32,
    /// Presence penalty, -2.0 to 2.0.
    pub presence_penalty: f32,
    /// Number of completions to generate.
    pub n: u32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl SamplingParams {
    /// Checks every float knob against its documented range.
    pub fn validate(&self) -> Result<()> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        Ok(())
    }
}

/// Returns `value` if it is finite and within `min..=max`.
pub(crate) fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<f32> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(Error::configuration(format!(
            "{name} expects a value between {min} and {max}, got {value}"
        )))
    }
}

/// Feature toggles for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    verbose: bool,
    history: bool,
    persist: bool,
    stream: bool,
}

impl FeatureFlags {
    /// Echo request bodies and raw stream chunks.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Enables or disables verbose output.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Send prior messages with each request and record each exchange in the log.
    pub fn history(&self) -> bool {
        self.history
    }

    /// Enables or disables history tracking.
    pub fn set_history(&mut self, history: bool) -> &mut Self {
        self.history = history;
        self
    }

    /// Write each exchange to the chat store as it happens.
    pub fn persist(&self) -> bool {
        self.persist
    }

    /// Enables or disables persistence of new exchanges.
    pub fn set_persist(&mut self, persist: bool) -> &mut Self {
        self.persist = persist;
        self
    }

    /// Use the streaming API.
    pub fn stream(&self) -> bool {
        self.stream
    }

    /// Enables or disables streaming.
    pub fn set_stream(&mut self, stream: bool) -> &mut Self {
        self.stream = stream;
        self
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            verbose: false,
            history: true,
            persist: false,
            stream: false,
        }
    }
}

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Model identifier.
    pub model: String,
    /// Sampling knobs.
    pub sampling: SamplingParams,
    /// Feature toggles.
    pub flags: FeatureFlags,
    /// Path of the SQLite chat store.
    pub database: PathBuf,
    /// API base URL; the client default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout in seconds; the client default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl SessionConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - Model: gpt-3.5-turbo
    /// - Sampling: all server defaults
    /// - History: on; verbose, persist and stream: off
    /// - Database: chat-hist.db
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            sampling: SamplingParams::default(),
            flags: FeatureFlags::default(),
            database: PathBuf::from(DEFAULT_DATABASE),
            base_url: None,
            timeout_secs: None,
        }
    }

    /// Loads a configuration from a YAML file.  Missing fields take their defaults.
    ///
    /// Sampling knobs outside their ranges are a configuration error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            Error::io(format!("failed to read config {}", path.display()), err)
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.sampling.validate()?;
        Ok(config)
    }

    /// Writes the configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), content).map_err(|err| {
            Error::io(
                format!("failed to write config {}", path.as_ref().display()),
                err,
            )
        })
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling knobs.
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Sets the feature flags.
    pub fn with_flags(mut self, flags: FeatureFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the chat store path.
    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = database.into();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SessionConfig::new();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.sampling, SamplingParams::default());
        assert!(config.flags.history());
        assert!(!config.flags.verbose());
        assert!(!config.flags.persist());
        assert!(!config.flags.stream());
        assert_eq!(config.database, PathBuf::from("chat-hist.db"));
    }

    #[test]
    fn flag_setters_are_independent() {
        let mut flags = FeatureFlags::default();
        flags.set_stream(true).set_verbose(true);
        assert!(flags.stream());
        assert!(flags.verbose());
        assert!(flags.history());
        assert!(!flags.persist());

        flags.set_verbose(false);
        assert!(flags.stream());
        assert!(!flags.verbose());
    }

    #[test]
    fn yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.yaml");
        let mut config = SessionConfig::new().with_model("gpt-4");
        config.sampling.temperature = 0.7;
        config.flags.set_stream(true);
        config.to_file(&path).unwrap();

        let loaded = SessionConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: SessionConfig =
            serde_yaml::from_str("model: gpt-4\nsampling:\n  top_p: 0.5\n").unwrap();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.sampling.top_p, 0.5);
        assert_eq!(config.sampling.temperature, 0.0);
        assert!(config.flags.history());
        assert_eq!(config.database, PathBuf::from(DEFAULT_DATABASE));
    }

    #[test]
    fn out_of_range_yaml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.yaml");
        for yaml in [
            "sampling:\n  temperature: .nan\n",
            "sampling:\n  temperature: 2.5\n",
            "sampling:\n  top_p: -0.1\n",
            "sampling:\n  presence_penalty: 3.0\n",
        ] {
            fs::write(&path, yaml).unwrap();
            let err = SessionConfig::from_file(&path).unwrap_err();
            assert!(err.is_configuration(), "{yaml}");
        }

        fs::write(&path, "sampling:\n  temperature: 2.0\n  presence_penalty: -2.0\n").unwrap();
        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.sampling.temperature, 2.0);
    }

    #[test]
    fn env_file_with_assignment() {
        let content = "# secrets\nOTHER=1\nexport OPENAI_API_KEY=\"sk-test\"\n";
        assert_eq!(parse_env_file(content), Some("sk-test".to_string()));
    }

    #[test]
    fn env_file_with_bare_key() {
        assert_eq!(parse_env_file("sk-bare\n"), Some("sk-bare".to_string()));
        assert_eq!(parse_env_file("\n\n"), None);
    }

    #[test]
    fn credentials_debug_redacts_key() {
        let credentials = Credentials::new("sk-secret").with_organization("org-1");
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("org-1"));
    }
}
