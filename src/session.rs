//! Conversation state and the exchanges that change it.
//!
//! A [`Session`] owns the configuration, the message log, the streaming accumulator and
//! the chat store.  One exchange runs at a time: every method that talks to the server
//! is awaited to completion before the next call.
//!
//! A failed exchange leaves the log and the store untouched.  A successful one appends
//! the user message and the answer to the log when history is on, and writes both to
//! the bound chat when persistence is on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{OpenAi, error_from_status};
use crate::config::{Credentials, FeatureFlags, SamplingParams, SessionConfig};
use crate::error::{Error, Result};
use crate::history::MessageLog;
use crate::observability::BUFFERED_PARSE_ERRORS;
use crate::payload::{CHAT_COMPLETIONS_PATH, build_request};
use crate::render::Renderer;
use crate::store::{ChatRecord, ChatStore};
use crate::stream::StreamConsumer;
use crate::transport::{HttpResponse, Transport};
use crate::types::{ChatCompletion, Message, ModelInfo, ModelList};

/// Path of the model listing endpoint relative to the base URL.
pub const MODELS_PATH: &str = "models";

/// A conversation with a chat completion API.
pub struct Session<T: Transport = OpenAi> {
    transport: T,
    config: SessionConfig,
    chat_id: Option<i64>,
    history: MessageLog,
    scratch: String,
    store: Option<ChatStore>,
}

/// A snapshot of the session's settings for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub model: String,
    pub sampling: SamplingParams,
    pub flags: FeatureFlags,
    pub chat_id: Option<i64>,
    pub messages: usize,
    pub database: PathBuf,
    pub store_open: bool,
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |on: bool| if on { "on" } else { "off" };
        writeln!(f, "model: {}", self.model)?;
        writeln!(f, "n: {}", self.sampling.n)?;
        writeln!(f, "max_tokens: {}", self.sampling.max_tokens)?;
        writeln!(f, "presence_penalty: {:.5}", self.sampling.presence_penalty)?;
        writeln!(f, "temperature: {:.5}", self.sampling.temperature)?;
        writeln!(f, "top_p: {:.5}", self.sampling.top_p)?;
        writeln!(f, "verbose: {}", on_off(self.flags.verbose()))?;
        writeln!(f, "history: {}", on_off(self.flags.history()))?;
        writeln!(f, "persist: {}", on_off(self.flags.persist()))?;
        writeln!(f, "stream: {}", on_off(self.flags.stream()))?;
        match self.chat_id {
            Some(id) => writeln!(f, "chat: {id}")?,
            None => writeln!(f, "chat: none")?,
        }
        writeln!(f, "messages: {}", self.messages)?;
        write!(
            f,
            "database: {}{}",
            self.database.display(),
            if self.store_open { " (open)" } else { "" }
        )
    }
}

impl Session<OpenAi> {
    /// Creates a session talking to the configured API endpoint.
    pub fn connect(credentials: Credentials, config: SessionConfig) -> Result<Self> {
        let transport = OpenAi::with_options(
            credentials,
            config.base_url.clone(),
            config.timeout_secs.map(Duration::from_secs),
        )?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> Session<T> {
    /// Creates a session over `transport`.  The store is not opened until needed.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            chat_id: None,
            history: MessageLog::new(),
            scratch: String::new(),
            store: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mutable access to model, sampling knobs and flags.
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn history(&self) -> &MessageLog {
        &self.history
    }

    /// The chat new messages are persisted to, if one is bound.
    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            model: self.config.model.clone(),
            sampling: self.config.sampling,
            flags: self.config.flags,
            chat_id: self.chat_id,
            messages: self.history.len(),
            database: self.config.database.clone(),
            store_open: self.store.is_some(),
        }
    }

    ///////////////////////////////////////// Exchanges ////////////////////////////////////////

    /// Sends `user_msg` using the streaming or buffered API depending on the stream flag.
    pub async fn send(
        &mut self,
        user_msg: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<String>> {
        if self.config.flags.stream() {
            self.chat_stream(user_msg, renderer).await.map(Some)
        } else {
            self.chat(user_msg, renderer).await
        }
    }

    /// Performs one buffered exchange.
    ///
    /// Returns the answer, or `None` when the body could not be interpreted.  The latter
    /// is logged and leaves the session unchanged.
    pub async fn chat(
        &mut self,
        user_msg: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<String>> {
        let body = build_request(&self.config, &self.history, user_msg, false)?;
        if self.config.flags.verbose() {
            renderer.print_raw(&body);
        }

        let response = self
            .transport
            .post(CHAT_COMPLETIONS_PATH, body)
            .await
            .inspect_err(|err| tracing::warn!("chat request failed: {err}"))?;
        check_json_response(&response)?;

        let completion = match serde_json::from_slice::<ChatCompletion>(&response.body) {
            Ok(completion) => completion,
            Err(err) => {
                BUFFERED_PARSE_ERRORS.click();
                let warning = format!("ignoring unparseable chat completion: {err}");
                tracing::warn!("{warning}");
                renderer.print_warning(&warning);
                return Ok(None);
            }
        };
        let Some(answer) = completion.answer() else {
            BUFFERED_PARSE_ERRORS.click();
            tracing::warn!("chat completion carried no answer");
            renderer.print_warning("chat completion carried no answer");
            return Ok(None);
        };
        let answer = answer.to_string();

        renderer.start_response(&self.config.model);
        renderer.print_text(&answer);
        renderer.finish_response();

        self.record_exchange(user_msg, &answer)?;
        Ok(Some(answer))
    }

    /// Performs one streaming exchange, rendering content as it arrives.
    ///
    /// Returns the accumulated answer.  A server error, sent in place of frames or as an
    /// `error` frame, is
    /// rendered as a warning and returned as [`Error::Api`]; the exchange is not
    /// recorded.
    pub async fn chat_stream(
        &mut self,
        user_msg: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        let verbose = self.config.flags.verbose();
        let body = build_request(&self.config, &self.history, user_msg, true)?;
        if verbose {
            renderer.print_raw(&body);
        }

        self.scratch.clear();
        renderer.start_response(&self.config.model);
        let mut consumer = StreamConsumer::new(&mut self.scratch, &mut *renderer, verbose);
        let result = self
            .transport
            .stream_post(CHAT_COMPLETIONS_PATH, body, &mut consumer)
            .await;
        let outcome = consumer.into_outcome();
        renderer.finish_response();

        if let Err(err) = result {
            self.scratch.clear();
            if outcome.interrupted {
                renderer.print_interrupted();
            } else {
                tracing::warn!("streaming request failed: {err}");
            }
            return Err(err);
        }
        if let Some(message) = outcome.server_error {
            self.scratch.clear();
            return Err(Error::api(200, Some("server_error".to_string()), message));
        }
        if !outcome.finished {
            tracing::debug!(frames = outcome.frames, "stream closed without a finish reason");
        }

        let answer = std::mem::take(&mut self.scratch);
        self.record_exchange(user_msg, &answer)?;
        Ok(answer)
    }

    /// Lists the models available to the credentials, sorted by id.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self.transport.get(MODELS_PATH).await?;
        check_json_response(&response)?;
        let list: ModelList = serde_json::from_slice(&response.body)?;
        let mut models = list.data;
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }

    /// Applies a completed exchange to the store and then to the log.
    fn record_exchange(&mut self, user_msg: &str, answer: &str) -> Result<()> {
        let user = Message::user(user_msg);
        let assistant = Message::assistant(answer);
        if self.config.flags.persist() {
            let chat_id = self.ensure_chat()?;
            let store = Self::open_store(&mut self.store, &self.config.database)?;
            store.insert_messages(chat_id, [&user, &assistant])?;
        }
        if self.config.flags.history() {
            self.history.push(user);
            self.history.push(assistant);
        }
        Ok(())
    }

    ////////////////////////////////////////// History /////////////////////////////////////////

    /// Adds a system message to the log, writing it to the bound chat when persisting.
    pub fn inject_system(&mut self, prompt: &str) -> Result<()> {
        let message = Message::system(prompt);
        if self.config.flags.persist() {
            let chat_id = self.ensure_chat()?;
            Self::open_store(&mut self.store, &self.config.database)?
                .insert_message(chat_id, &message)?;
        }
        self.history.push(message);
        Ok(())
    }

    /// Removes the log entry at `index`.
    pub fn delete_history_entry(&mut self, index: usize) -> Option<Message> {
        self.history.delete(index)
    }

    /// Empties the log.  Without persistence the chat binding is dropped as well.
    pub fn clear_history(&mut self) {
        self.history.clear();
        if !self.config.flags.persist() {
            self.chat_id = None;
        }
    }

    /// Prints the log.
    pub fn render_history(&self, renderer: &mut dyn Renderer) {
        self.history.render(renderer);
    }

    //////////////////////////////////////// Persistence ////////////////////////////////////////

    fn open_store<'a>(store: &'a mut Option<ChatStore>, path: &Path) -> Result<&'a mut ChatStore> {
        if store.is_none() {
            tracing::debug!(path = %path.display(), "opening chat store");
            *store = Some(ChatStore::open(path)?);
        }
        store
            .as_mut()
            .ok_or_else(|| Error::store("chat store unavailable", None))
    }

    fn ensure_chat(&mut self) -> Result<i64> {
        match self.chat_id {
            Some(id) => Ok(id),
            None => self.new_chat(),
        }
    }

    /// Opens the chat store if it is not open yet.
    pub fn init_store(&mut self) -> Result<()> {
        Self::open_store(&mut self.store, &self.config.database).map(|_| ())
    }

    /// Uses `store` instead of opening the configured database.
    pub fn attach_store(&mut self, store: ChatStore) {
        self.store = Some(store);
    }

    /// Creates a chat bound to the current model and makes it the current chat.
    pub fn new_chat(&mut self) -> Result<i64> {
        let store = Self::open_store(&mut self.store, &self.config.database)?;
        let id = store.create_chat(&self.config.model)?;
        tracing::debug!(chat_id = id, "bound new chat");
        self.chat_id = Some(id);
        Ok(id)
    }

    /// Writes every log entry to the current chat, binding a new chat if needed.
    ///
    /// Saving twice writes the messages twice.
    pub fn save_history(&mut self) -> Result<usize> {
        let chat_id = self.ensure_chat()?;
        let store = Self::open_store(&mut self.store, &self.config.database)?;
        store.insert_messages(chat_id, &self.history)
    }

    /// Saves the log and keeps writing future exchanges as they happen.
    pub fn autosave(&mut self) -> Result<usize> {
        let saved = self.save_history()?;
        self.config.flags.set_persist(true);
        Ok(saved)
    }

    /// Turns on persistence of future exchanges in a fresh chat.
    pub fn enable_persistence(&mut self) -> Result<i64> {
        self.config.flags.set_persist(true);
        self.new_chat()
    }

    /// Renames a chat.  Returns whether it exists.
    pub fn rename_chat(&mut self, id: i64, name: &str) -> Result<bool> {
        Self::open_store(&mut self.store, &self.config.database)?.rename_chat(id, name)
    }

    /// Deletes a chat with its messages.  Deleting the current chat unbinds it.
    pub fn delete_chat(&mut self, id: i64) -> Result<bool> {
        let existed = Self::open_store(&mut self.store, &self.config.database)?.delete_chat(id)?;
        if self.chat_id == Some(id) {
            self.chat_id = None;
        }
        Ok(existed)
    }

    /// Deletes one stored message by its store id.
    pub fn delete_message(&mut self, id: i64) -> Result<bool> {
        Self::open_store(&mut self.store, &self.config.database)?.delete_message(id)
    }

    pub fn list_chat_ids(&mut self) -> Result<Vec<i64>> {
        Self::open_store(&mut self.store, &self.config.database)?.chat_ids()
    }

    pub fn list_chats(&mut self) -> Result<Vec<ChatRecord>> {
        Self::open_store(&mut self.store, &self.config.database)?.list_chats()
    }

    /// Replaces the log with a stored chat and binds it.  Returns the message count.
    pub fn load_chat(&mut self, id: i64) -> Result<usize> {
        let store = Self::open_store(&mut self.store, &self.config.database)?;
        if !store.chat_exists(id)? {
            return Err(Error::not_found(
                format!("no chat with id {id}"),
                Some("chat".to_string()),
                Some(id.to_string()),
            ));
        }
        let messages: Vec<Message> = store
            .messages_for_chat(id)?
            .into_iter()
            .map(|record| record.message)
            .collect();
        let count = messages.len();
        self.history.replace(messages);
        self.chat_id = Some(id);
        Ok(count)
    }
}

/// Requires a 2xx status with a JSON body.
fn check_json_response(response: &HttpResponse) -> Result<()> {
    if !response.is_success() {
        let body = String::from_utf8_lossy(&response.body);
        return Err(error_from_status(response.status, &body, None));
    }
    if !response.is_json() {
        return Err(Error::api(
            response.status,
            Some("unexpected_content_type".to_string()),
            format!(
                "expected application/json, got {}",
                response.content_type.as_deref().unwrap_or("no content type")
            ),
        ));
    }
    Ok(())
}
