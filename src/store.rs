//! SQLite storage for chats and their messages.

use std::path::Path;

use rusqlite::{Connection, Error as SqlError, OptionalExtension, params, types::Type};
use time::PrimitiveDateTime;
use time::macros::format_description;

use crate::error::{Error, Result};
use crate::observability::{STORE_CHATS_CREATED, STORE_MESSAGES_WRITTEN};
use crate::types::{Message, Role};

const SCHEMA: &str = "PRAGMA foreign_keys = ON;
     CREATE TABLE IF NOT EXISTS chat (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         name TEXT,
         created DATETIME DEFAULT CURRENT_TIMESTAMP,
         model TEXT
     );

     CREATE TABLE IF NOT EXISTS messages (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         chat_id INT REFERENCES chat(id) ON DELETE CASCADE,
         created DATETIME DEFAULT CURRENT_TIMESTAMP,
         role INT,
         msg TEXT
     );";

/// A persisted chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub id: i64,
    pub name: Option<String>,
    pub created: Option<PrimitiveDateTime>,
    pub model: Option<String>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub chat_id: i64,
    pub created: Option<PrimitiveDateTime>,
    pub message: Message,
}

/// A connection to the chat database.
pub struct ChatStore {
    conn: Connection,
}

impl ChatStore {
    /// Opens (creating if needed) the database at `path` and initializes the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|err| {
            Error::store(format!("cannot open {}", path.display()), Some(err))
        })?;
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| Error::store("cannot open in-memory database", Some(err)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|err| Error::store("schema initialization failed", Some(err)))?;
        Ok(Self { conn })
    }

    /// Inserts a chat bound to `model` and returns its id.
    pub fn create_chat(&self, model: &str) -> Result<i64> {
        self.conn
            .execute("INSERT INTO chat (model) VALUES (?1)", params![model])?;
        STORE_CHATS_CREATED.click();
        Ok(self.conn.last_insert_rowid())
    }

    /// Sets the display name of a chat.  Returns whether the chat exists.
    pub fn rename_chat(&self, id: i64, name: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE chat SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        Ok(changed > 0)
    }

    /// Deletes a chat and, by cascade, its messages.  Returns whether it existed.
    pub fn delete_chat(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM chat WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn chat_exists(&self, id: i64) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM chat WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Ids of every chat, oldest first.
    pub fn chat_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM chat ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Every chat, oldest first.
    pub fn list_chats(&self) -> Result<Vec<ChatRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created, model FROM chat ORDER BY id")?;
        let rows = stmt.query_map([], Self::map_chat_row)?;
        let mut chats = Vec::new();
        for chat in rows {
            chats.push(chat?);
        }
        Ok(chats)
    }

    /// Appends one message to a chat and returns the message id.
    pub fn insert_message(&self, chat_id: i64, message: &Message) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO messages (chat_id, role, msg) VALUES (?1, ?2, ?3)",
            params![chat_id, message.role().code(), message.content()],
        )?;
        STORE_MESSAGES_WRITTEN.click();
        Ok(self.conn.last_insert_rowid())
    }

    /// Appends several messages to a chat in one transaction, preserving their order.
    pub fn insert_messages<'a, I>(&mut self, chat_id: i64, messages: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        let tx = self.conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt =
                tx.prepare("INSERT INTO messages (chat_id, role, msg) VALUES (?1, ?2, ?3)")?;
            for message in messages {
                stmt.execute(params![chat_id, message.role().code(), message.content()])?;
                count += 1;
            }
        }
        tx.commit()?;
        STORE_MESSAGES_WRITTEN.count(count as u64);
        Ok(count)
    }

    /// Messages of a chat in the order they were stored.
    pub fn messages_for_chat(&self, chat_id: i64) -> Result<Vec<MessageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, chat_id, created, role, msg FROM messages WHERE chat_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![chat_id], Self::map_message_row)?;
        let mut messages = Vec::new();
        for message in rows {
            messages.push(message?);
        }
        Ok(messages)
    }

    /// Deletes one message.  Returns whether it existed.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Parses SQLite's `CURRENT_TIMESTAMP` layout.
    fn parse_created(
        raw: Option<String>,
        column_index: usize,
    ) -> rusqlite::Result<Option<PrimitiveDateTime>> {
        let layout = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        raw.map(|value| {
            PrimitiveDateTime::parse(&value, layout).map_err(|error| {
                SqlError::FromSqlConversionFailure(column_index, Type::Text, Box::new(error))
            })
        })
        .transpose()
    }

    fn code_to_role(code: i64, column_index: usize) -> rusqlite::Result<Role> {
        Role::from_code(code).ok_or_else(|| {
            SqlError::FromSqlConversionFailure(
                column_index,
                Type::Integer,
                format!("unknown message role code: {code}").into(),
            )
        })
    }

    fn map_chat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRecord> {
        Ok(ChatRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            created: Self::parse_created(row.get(2)?, 2)?,
            model: row.get(3)?,
        })
    }

    fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
        let role = Self::code_to_role(row.get(3)?, 3)?;
        let content: Option<String> = row.get(4)?;
        Ok(MessageRecord {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            created: Self::parse_created(row.get(2)?, 2)?,
            message: Message::new(role, content.unwrap_or_default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_messages() -> Vec<Message> {
        vec![
            Message::system("be terse"),
            Message::user("hi"),
            Message::assistant("hello"),
        ]
    }

    #[test]
    fn create_chat_returns_increasing_ids() {
        let store = ChatStore::open_in_memory().unwrap();
        let first = store.create_chat("gpt-4").unwrap();
        let second = store.create_chat("gpt-3.5-turbo").unwrap();
        assert!(second > first);
        assert_eq!(store.chat_ids().unwrap(), vec![first, second]);

        let chats = store.list_chats().unwrap();
        assert_eq!(chats[0].model.as_deref(), Some("gpt-4"));
        assert_eq!(chats[0].name, None);
        assert!(chats[0].created.is_some());
    }

    #[test]
    fn three_messages_round_trip_in_order() {
        let mut store = ChatStore::open_in_memory().unwrap();
        let other = store.create_chat("m").unwrap();
        let chat = store.create_chat("m").unwrap();
        store.insert_message(other, &Message::user("elsewhere")).unwrap();
        assert_eq!(store.insert_messages(chat, &three_messages()).unwrap(), 3);

        let records = store.messages_for_chat(chat).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.chat_id == chat));
        let messages: Vec<_> = records.into_iter().map(|r| r.message).collect();
        assert_eq!(messages, three_messages());
    }

    #[test]
    fn delete_chat_cascades() {
        let mut store = ChatStore::open_in_memory().unwrap();
        let chat = store.create_chat("m").unwrap();
        store.insert_messages(chat, &three_messages()).unwrap();

        assert!(store.delete_chat(chat).unwrap());
        assert!(!store.delete_chat(chat).unwrap());
        assert!(!store.chat_ids().unwrap().contains(&chat));
        let orphans: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn rename_and_delete_message() {
        let store = ChatStore::open_in_memory().unwrap();
        let chat = store.create_chat("m").unwrap();
        assert!(store.rename_chat(chat, "groceries").unwrap());
        assert!(!store.rename_chat(chat + 100, "nothing").unwrap());
        assert_eq!(store.list_chats().unwrap()[0].name.as_deref(), Some("groceries"));

        let id = store.insert_message(chat, &Message::user("x")).unwrap();
        assert!(store.delete_message(id).unwrap());
        assert!(store.messages_for_chat(chat).unwrap().is_empty());
        assert!(store.chat_exists(chat).unwrap());
        assert!(!store.chat_exists(chat + 1).unwrap());
    }

    #[test]
    fn unknown_role_code_is_an_error() {
        let store = ChatStore::open_in_memory().unwrap();
        let chat = store.create_chat("m").unwrap();
        store
            .conn
            .execute(
                "INSERT INTO messages (chat_id, role, msg) VALUES (?1, 3, 'odd')",
                params![chat],
            )
            .unwrap();
        let err = store.messages_for_chat(chat).unwrap_err();
        assert!(err.is_store());
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat-hist.db");
        let chat = {
            let mut store = ChatStore::open(&path).unwrap();
            let chat = store.create_chat("m").unwrap();
            store.insert_messages(chat, &three_messages()).unwrap();
            chat
        };
        let store = ChatStore::open(&path).unwrap();
        assert_eq!(store.chat_ids().unwrap(), vec![chat]);
        assert_eq!(store.messages_for_chat(chat).unwrap().len(), 3);
    }
}
