//! Chat transcript reconstructed from script output.

use serde::{Deserialize, Serialize};

/// Speaker of a transcript turn.
///
/// Serialized as `user` or `assistant`; the console page picks the display
/// label from that value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// Messages with role `user`.
    User,
    /// Every other role.
    Assistant,
}

impl Speaker {
    /// Map a raw `role` value onto a speaker.
    #[must_use]
    pub fn from_role(role: &str) -> Self {
        if role == "user" {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

/// One `(speaker, content)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    /// Who spoke.
    pub speaker: Speaker,
    /// What was said.
    pub content: String,
}
