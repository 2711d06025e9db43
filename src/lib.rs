//! A conversational client for OpenAI-style chat completion APIs.
//!
//! A [`Session`] sends user messages with the running conversation, renders the answer
//! either as it streams in or all at once, keeps a [`MessageLog`], and can persist chats
//! to SQLite through a [`ChatStore`].

// Public modules
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod observability;
pub mod payload;
pub mod render;
pub mod session;
pub mod store;
pub mod stream;
pub mod transport;
pub mod types;

// Re-exports
pub use client::OpenAi;
pub use config::{Credentials, FeatureFlags, SamplingParams, SessionConfig};
pub use error::{Error, Result};
pub use history::MessageLog;
pub use observability::register_biometrics;
pub use payload::{ChatRequest, build_request};
pub use render::{CaptureRenderer, PlainTextRenderer, Renderer, Rendered};
pub use session::{Session, SessionInfo};
pub use store::{ChatRecord, ChatStore, MessageRecord};
pub use stream::{StreamConsumer, StreamOutcome};
pub use transport::{ChunkHandler, HttpResponse, Transport};
pub use types::*;
