use crate::render::Renderer;
use crate::types::{Message, Role};

/// The ordered conversation log of a session.
///
/// The log owns its messages.  Removal hands ownership back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message built from its parts.
    pub fn append(&mut self, role: Role, name: Option<&str>, content: impl Into<String>) {
        let message = match name {
            Some(name) => Message::with_name(role, name, content),
            None => Message::new(role, content),
        };
        self.push(message);
    }

    /// Appends a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Removes and returns the message at `index`, or `None` when out of range.
    pub fn delete(&mut self, index: usize) -> Option<Message> {
        if index < self.messages.len() {
            Some(self.messages.remove(index))
        } else {
            None
        }
    }

    /// Drops every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Replaces the whole log.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Prints every message with its position.
    pub fn render(&self, renderer: &mut dyn Renderer) {
        for (index, message) in self.messages.iter().enumerate() {
            renderer.print_message(index, message);
        }
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
