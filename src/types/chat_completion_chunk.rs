use serde::{Deserialize, Serialize};

use super::ApiErrorObject;

/// The JSON value carried by one `data:` frame of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Incremental choices; parley reads the first.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,

    /// Some servers report the finish reason outside of `choices`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Set when the server reports a failure in place of a delta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorObject>,
}

impl ChatCompletionChunk {
    /// The content fragment of the first choice's delta.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }

    /// The finish reason, checked at the choice level first and then at the top level.
    ///
    /// A `null` finish reason is the same as an absent one.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
            .or(self.finish_reason.as_deref())
    }
}

/// One choice inside a streamed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Position of the choice.
    #[serde(default)]
    pub index: u32,

    /// The incremental update.
    #[serde(default)]
    pub delta: Delta,

    /// Set on the frame that ends the stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// An incremental update to the assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Present on the first frame only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// The next fragment of generated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
