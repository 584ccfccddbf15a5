//! Capabilities the operator drives but does not implement.
//!
//! Every method on these traits touches the platform UI. They report
//! failures as a classified [`Fault`] so the retry layer can decide between
//! retrying in place and escalating to recalibration.

pub mod web;
pub mod webdriver;

pub use web::WebSurface;
pub use webdriver::{WebDriverConfig, connect};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, ConversationId};
use crate::error::{AuthError, Fault};

/// What one poll of the conversation list observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResult {
    /// Conversations seen for the first time or with new activity.
    pub new_or_updated: Vec<ConversationId>,
    /// Conversations currently showing an unread marker.
    pub unread: Vec<ConversationId>,
    /// Conversations the platform no longer lists.
    #[serde(default)]
    pub gone: Vec<ConversationId>,
}

impl PollResult {
    pub fn is_empty(&self) -> bool {
        self.new_or_updated.is_empty() && self.unread.is_empty() && self.gone.is_empty()
    }
}

/// Gets the automation session logged in to the platform.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Block until logged in, waiting at most `max_wait` for a manual login.
    async fn ensure_authenticated(&self, max_wait: Duration) -> Result<(), AuthError>;
}

/// Discovers conversations and their unread state.
#[async_trait]
pub trait ConversationPoller: Send + Sync {
    async fn poll_once(&self) -> Result<PollResult, Fault>;
}

/// Reads the message history of one conversation.
#[async_trait]
pub trait ConversationReader: Send + Sync {
    /// Open `id` and return its messages, oldest first.
    async fn read(&self, id: &ConversationId) -> Result<Conversation, Fault>;
}

/// Delivers text into the currently open conversation.
///
/// Sending is split so that only the idempotent part is ever repeated.
/// [`prepare`](Self::prepare) may run several times for one message and
/// must leave the input holding exactly `text`. [`commit`](Self::commit)
/// hands the message to the platform and is attempted once per message.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Put `text` into the message input, replacing whatever is there.
    async fn prepare(&self, text: &str) -> Result<(), Fault>;

    /// Submit the prepared message.
    async fn commit(&self) -> Result<(), Fault>;

    /// Wait for the platform to register a committed message.
    async fn settle(&self) {}

    async fn send(&self, text: &str) -> Result<(), Fault> {
        self.prepare(text).await?;
        self.commit().await?;
        self.settle().await;
        Ok(())
    }
}
