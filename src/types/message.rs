use serde::{Deserialize, Serialize};

use crate::types::Role;

/// A single message in a conversation.
///
/// The content is fixed when the message is built; there are no mutators.  Content is
/// stored unescaped and is escaped once, when a request body is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Message {
    /// Creates a message without an author name.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Creates a message attributed to a named author.
    pub fn with_name(role: Role, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: Some(name.into()),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// The author role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The optional author name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The message text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Consumes the message, returning its text.
    pub fn into_content(self) -> String {
        self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_role_and_content() {
        let message = Message::user("say \"hi\"\n");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"say \"hi\"\n"}"#);
    }

    #[test]
    fn name_is_serialized_when_present() {
        let message = Message::with_name(Role::System, "Geof", "be brief");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"role": "system", "content": "be brief", "name": "Geof"})
        );
        assert_eq!(message.name(), Some("Geof"));
    }
}
