//! Conversation processing pipeline: read → generate → send.
//!
//! Read and message preparation go through the retry classifier. The send
//! commit is attempted exactly once per reply, so a slow platform can never
//! receive the same message twice. Generation is not retried: a chatbot
//! failure says nothing about the platform selectors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::chatbot::Chatbot;
use crate::config::{OperatorConfig, StepTimeouts};
use crate::conversation::{Conversation, ConversationId};
use crate::error::{ChatbotError, PipelineError};
use crate::operator::retry::{RetryPolicy, bounded};
use crate::surface::{ConversationReader, MessageSender};

/// What the pipeline did with a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// A response was generated and sent.
    Replied { response: String },
    /// Nothing to reply to.
    NoMessages,
    /// The chatbot produced an empty reply, so nothing was sent.
    EmptyResponse,
}

impl PipelineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Replied { .. } => "replied",
            Self::NoMessages => "no_messages",
            Self::EmptyResponse => "empty_response",
        }
    }
}

/// Result of one successful pass through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedConversation {
    pub conversation: Conversation,
    pub outcome: PipelineOutcome,
    pub processed_at: DateTime<Utc>,
}

/// Runs one conversation through read → generate → send.
pub struct ConversationPipeline {
    reader: Arc<dyn ConversationReader>,
    chatbot: Arc<dyn Chatbot>,
    sender: Arc<dyn MessageSender>,
    retry: RetryPolicy,
    message_cap: usize,
    timeouts: StepTimeouts,
}

impl ConversationPipeline {
    pub fn new(
        reader: Arc<dyn ConversationReader>,
        chatbot: Arc<dyn Chatbot>,
        sender: Arc<dyn MessageSender>,
        config: &OperatorConfig,
    ) -> Self {
        Self {
            reader,
            chatbot,
            sender,
            retry: RetryPolicy::new(config.max_attempts),
            message_cap: config.message_cap,
            timeouts: config.timeouts,
        }
    }

    pub async fn process(
        &self,
        id: &ConversationId,
    ) -> Result<ProcessedConversation, PipelineError> {
        info!(conversation = %id, "Processing conversation");

        // Step 1: read
        let mut conversation = self
            .retry
            .run("read", |_| bounded("read", self.timeouts.read, self.reader.read(id)))
            .await
            .map_err(PipelineError::Read)?;

        let evicted = conversation.enforce_cap(self.message_cap);
        if evicted > 0 {
            warn!(
                conversation = %id,
                evicted,
                kept = self.message_cap,
                "Conversation over message cap, dropped oldest messages"
            );
        }
        debug!(conversation = %id, messages = conversation.messages.len(), "Read conversation");
        trace!(conversation = %id, history = %conversation.history_text(), "Conversation history");

        if conversation.is_empty() {
            info!(conversation = %id, "No messages in conversation, skipping");
            return Ok(self.finish(conversation, PipelineOutcome::NoMessages));
        }

        // Step 2: generate
        let response = match tokio::time::timeout(
            self.timeouts.generate,
            self.chatbot.respond(&conversation),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ChatbotError::Timeout {
                    timeout: self.timeouts.generate,
                }
                .into());
            }
        };

        if response.trim().is_empty() {
            warn!(conversation = %id, chatbot = self.chatbot.name(), "Empty chatbot response, skipping send");
            return Ok(self.finish(conversation, PipelineOutcome::EmptyResponse));
        }

        // Step 3: send
        let preview: String = response.chars().take(100).collect();
        info!(conversation = %id, response = %preview, "Sending response");
        self.retry
            .run("send", |_| bounded("send", self.timeouts.send, self.sender.prepare(&response)))
            .await
            .map_err(PipelineError::Send)?;
        bounded("send", self.timeouts.send, self.sender.commit())
            .await
            .map_err(PipelineError::Commit)?;
        self.sender.settle().await;

        info!(conversation = %id, "Conversation processed successfully");
        Ok(self.finish(conversation, PipelineOutcome::Replied { response }))
    }

    fn finish(&self, conversation: Conversation, outcome: PipelineOutcome) -> ProcessedConversation {
        ProcessedConversation {
            conversation,
            outcome,
            processed_at: Utc::now(),
        }
    }
}
