use async_trait::async_trait;

use super::Chatbot;
use crate::conversation::Conversation;
use crate::error::ChatbotError;

/// Fallback backend: the reply is the text of the most recent message.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoChatbot;

#[async_trait]
impl Chatbot for EchoChatbot {
    fn name(&self) -> &str {
        "echo"
    }

    async fn respond(&self, conversation: &Conversation) -> Result<String, ChatbotError> {
        let reply = conversation
            .last_message()
            .map(|m| m.text.clone())
            .unwrap_or_default();
        tracing::debug!(conversation = %conversation.id, chars = reply.len(), "Echo response");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    #[tokio::test]
    async fn echoes_last_message() {
        let mut conv = Conversation::new("conv2".into(), "Test");
        conv.push_capped(Message::user("first"), 50);
        conv.push_capped(Message::user("are you there?"), 50);

        let reply = EchoChatbot.respond(&conv).await.unwrap();
        assert_eq!(reply, "are you there?");
    }

    #[tokio::test]
    async fn empty_conversation_gives_empty_reply() {
        let conv = Conversation::new("conv2".into(), "Test");
        assert_eq!(EchoChatbot.respond(&conv).await.unwrap(), "");
    }
}
