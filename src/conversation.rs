//! Conversation and message types shared by the operator and its collaborators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of most-recent messages kept per conversation.
pub const DEFAULT_MESSAGE_CAP: usize = 50;

/// Opaque identifier of a conversation on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            sender,
            text: text.into(),
            sent_at,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, Utc::now())
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text, Utc::now())
    }
}

/// A conversation as read from the platform.
///
/// `messages` is ordered oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub platform: String,
    pub messages: Vec<Message>,
    pub has_unread: bool,
    pub last_message_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: ConversationId, platform: impl Into<String>) -> Self {
        Self {
            id,
            platform: platform.into(),
            messages: Vec::new(),
            has_unread: false,
            last_message_at: Utc::now(),
        }
    }

    /// Append a message, evicting the oldest ones beyond `cap`.
    pub fn push_capped(&mut self, message: Message, cap: usize) {
        self.last_message_at = message.sent_at;
        self.messages.push(message);
        self.enforce_cap(cap);
    }

    /// Drop the oldest messages so at most `cap` remain. Returns how many were evicted.
    pub fn enforce_cap(&mut self, cap: usize) -> usize {
        let excess = self.messages.len().saturating_sub(cap);
        if excess > 0 {
            self.messages.drain(..excess);
        }
        excess
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render the history as `SENDER: text` lines.
    pub fn history_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.sender.label().to_uppercase(), m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
