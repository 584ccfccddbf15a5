use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{Chatbot, ChatbotConfig};
use crate::conversation::Conversation;
use crate::error::ChatbotError;

/// Request timeout for the chatbot service.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatTurn<'a>>,
    conversation_id: &'a str,
    platform: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Chatbot backed by an external JSON API.
pub struct HttpChatbot {
    config: ChatbotConfig,
    client: reqwest::Client,
}

impl HttpChatbot {
    pub fn new(config: ChatbotConfig) -> Result<Self, ChatbotError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChatbotError::RequestFailed {
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }
}

fn build_request(conversation: &Conversation) -> ChatRequest<'_> {
    ChatRequest {
        messages: conversation
            .messages
            .iter()
            .map(|m| ChatTurn {
                role: m.sender.label(),
                content: &m.text,
            })
            .collect(),
        conversation_id: conversation.id.as_str(),
        platform: &conversation.platform,
    }
}

#[async_trait]
impl Chatbot for HttpChatbot {
    fn name(&self) -> &str {
        "http"
    }

    async fn respond(&self, conversation: &Conversation) -> Result<String, ChatbotError> {
        let body = build_request(conversation);

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChatbotError::Timeout {
                        timeout: REQUEST_TIMEOUT,
                    }
                } else {
                    ChatbotError::RequestFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatbotError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse =
            resp.json()
                .await
                .map_err(|e| ChatbotError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        let reply = parsed
            .response
            .filter(|r| !r.trim().is_empty())
            .ok_or(ChatbotError::EmptyResponse)?;

        tracing::info!(
            conversation = %conversation.id,
            chars = reply.len(),
            "Got chatbot response"
        );
        Ok(reply)
    }
}
