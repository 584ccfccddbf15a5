//! Response generation for conversations.
//!
//! Supports:
//! - **HTTP**: an external chatbot service reached over a bearer-authenticated JSON API
//! - **Echo**: replies with the most recent message, used when no service is configured
//!
//! The backend is chosen once, at construction time, from configuration.

mod echo;
mod http;

pub use echo::EchoChatbot;
pub use http::HttpChatbot;

use std::sync::Arc;

use async_trait::async_trait;

use crate::conversation::Conversation;
use crate::error::ChatbotError;

/// Produces the reply for a conversation.
#[async_trait]
pub trait Chatbot: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn respond(&self, conversation: &Conversation) -> Result<String, ChatbotError>;
}

/// Configuration for the HTTP chatbot backend.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    pub api_url: String,
    pub api_key: secrecy::SecretString,
}

impl ChatbotConfig {
    /// Build config from environment variables.
    /// Returns `None` unless both `CHATBOT_API_URL` and `CHATBOT_API_KEY` are set.
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("CHATBOT_API_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())?;
        let api_key = std::env::var("CHATBOT_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())?;

        Some(Self {
            api_url,
            api_key: secrecy::SecretString::from(api_key),
        })
    }
}

/// Select the chatbot backend: HTTP when configured, echo otherwise.
pub fn create_chatbot(config: Option<ChatbotConfig>) -> Result<Arc<dyn Chatbot>, ChatbotError> {
    match config {
        Some(config) => {
            tracing::info!(url = %config.api_url, "Using HTTP chatbot");
            Ok(Arc::new(HttpChatbot::new(config)?))
        }
        None => {
            tracing::warn!("Chatbot API not configured, using echo mode (replies with last message)");
            Ok(Arc::new(EchoChatbot))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_selects_echo() {
        let chatbot = create_chatbot(None).unwrap();
        assert_eq!(chatbot.name(), "echo");
    }

    #[test]
    fn configured_selects_http() {
        let config = ChatbotConfig {
            api_url: "http://localhost:9/chat".into(),
            api_key: secrecy::SecretString::from("test-key"),
        };
        let chatbot = create_chatbot(Some(config)).unwrap();
        assert_eq!(chatbot.name(), "http");
    }
}
