// Public modules
pub mod api_error;
pub mod chat_completion;
pub mod chat_completion_chunk;
pub mod message;
pub mod model_info;
pub mod role;

// Re-exports
pub use api_error::{ApiErrorObject, ErrorEnvelope};
pub use chat_completion::{ChatCompletion, CompletionChoice, CompletionMessage, Usage};
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, Delta};
pub use message::Message;
pub use model_info::{ModelInfo, ModelList};
pub use role::{Role, RoleParseError};
