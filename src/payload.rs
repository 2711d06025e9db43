//! Request bodies for `chat/completions`.

use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::history::MessageLog;
use crate::types::{Message, Role};

/// Path of the chat completion endpoint relative to the base URL.
pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// A borrowed view of one chat completion request.
///
/// Sampling knobs equal to zero are omitted so the server default applies.  Float knobs
/// are written with exactly five decimal places.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "is_zero_u32")]
    n: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32", serialize_with = "fixed5")]
    presence_penalty: f32,
    #[serde(skip_serializing_if = "is_zero_f32", serialize_with = "fixed5")]
    temperature: f32,
    #[serde(skip_serializing_if = "is_zero_f32", serialize_with = "fixed5")]
    top_p: f32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// One message as it appears in a request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WireMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role(),
            content: message.content(),
            name: message.name(),
        }
    }
}

impl<'a> ChatRequest<'a> {
    /// Assembles a request for `user_msg`.
    ///
    /// Prior messages from `history` are included, in order, only when the history flag
    /// is set.  The new message is always last and always has the user role.
    pub fn new(
        config: &'a SessionConfig,
        history: &'a MessageLog,
        user_msg: &'a str,
        stream: bool,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if config.flags.history() {
            messages.extend(history.iter().map(WireMessage::from));
        }
        messages.push(WireMessage {
            role: Role::User,
            content: user_msg,
            name: None,
        });
        let sampling = &config.sampling;
        Self {
            model: &config.model,
            n: sampling.n,
            max_tokens: sampling.max_tokens,
            presence_penalty: sampling.presence_penalty,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            messages,
            stream,
        }
    }

    /// Number of messages the request carries.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Serializes the request.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Builds the serialized request body for one exchange.
pub fn build_request(
    config: &SessionConfig,
    history: &MessageLog,
    user_msg: &str,
    stream: bool,
) -> Result<String> {
    ChatRequest::new(config, history, user_msg, stream).to_json()
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

fn is_zero_f32(value: &f32) -> bool {
    *value == 0.0
}

fn fixed5<S: Serializer>(value: &f32, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let raw = RawValue::from_string(format!("{value:.5}")).map_err(serde::ser::Error::custom)?;
    raw.serialize(serializer)
}
