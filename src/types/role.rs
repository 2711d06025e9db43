use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The author role of a conversation message.
///
/// Roles are persisted as integer codes; see [`Role::code`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input typed by the person driving the session.
    User,

    /// Output produced by the model.
    Assistant,

    /// Instructions that steer the model's behavior.
    System,

    /// The result of a function call.
    Function,
}

impl Role {
    /// The integer code stored in the `messages.role` column.
    pub const fn code(self) -> i64 {
        match self {
            Role::User => 0,
            Role::Assistant => 1,
            Role::System => 2,
            Role::Function => 4,
        }
    }

    /// Maps a stored integer code back to a role.
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Role::User),
            1 => Some(Role::Assistant),
            2 => Some(Role::System),
            4 => Some(Role::Function),
            _ => None,
        }
    }

    /// The role's name on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Function => "function",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug)]
pub struct RoleParseError {
    /// The value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown role: {}", self.invalid_value)
    }
}

impl std::error::Error for RoleParseError {}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "function" => Ok(Role::Function),
            _ => Err(RoleParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for role in [Role::User, Role::Assistant, Role::System, Role::Function] {
            assert_eq!(Role::from_code(role.code()), Some(role));
        }
        assert_eq!(Role::Function.code(), 4);
        assert_eq!(Role::from_code(3), None);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, r#""assistant""#);
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);
        assert!("robot".parse::<Role>().is_err());
    }
}
