//! Error types for the chat operator.

use std::path::PathBuf;
use std::time::Duration;

use fantoccini::error::{CmdError, ErrorStatus, NewSessionError};

use crate::conversation::ConversationId;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration cached for platform '{platform}' (expected {path})")]
    PlatformNotConfigured { platform: String, path: PathBuf },

    #[error("Invalid configuration for platform '{platform}': {reason}")]
    InvalidPlatformConfig { platform: String, reason: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication failures. Always fatal for the control loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Login to {platform} not completed within {waited:?}")]
    TimedOut { platform: String, waited: Duration },

    #[error("Login to {platform} rejected: {reason}")]
    Rejected { platform: String, reason: String },

    #[error("Could not reach {platform}: {reason}")]
    Unreachable { platform: String, reason: String },
}

/// A failure reported by one of the UI-facing collaborators (poll, read, send).
///
/// The variant is the classification: transient faults are retried in place,
/// structural faults mean the configured selectors no longer match the
/// platform, and `ConversationGone` removes a single conversation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("transient fault in {operation}: {reason}")]
    Transient { operation: String, reason: String },

    #[error("structural fault in {operation}: {reason}")]
    Structural { operation: String, reason: String },

    #[error("conversation {0} is gone")]
    ConversationGone(ConversationId),
}

impl Fault {
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn structural(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structural {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }

    /// Operation name for transient/structural faults.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::Transient { operation, .. } | Self::Structural { operation, .. } => {
                Some(operation)
            }
            Self::ConversationGone(_) => None,
        }
    }
}

/// Chatbot backend errors. These never escalate to recalibration.
#[derive(Debug, thiserror::Error)]
pub enum ChatbotError {
    #[error("Chatbot request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Chatbot returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid chatbot response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Empty response from chatbot")]
    EmptyResponse,

    #[error("Chatbot timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Failure of one pass through the conversation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Read failed: {0}")]
    Read(Fault),

    #[error("Send failed: {0}")]
    Send(Fault),

    /// The submit step failed or did not confirm in time. The message may
    /// already be on the platform, so it is never resubmitted.
    #[error("Send not confirmed: {0}")]
    Commit(Fault),

    #[error("Response generation failed: {0}")]
    Chatbot(#[from] ChatbotError),
}

impl PipelineError {
    /// The surface fault behind a read/send failure, if any.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Read(fault) | Self::Send(fault) | Self::Commit(fault) => Some(fault),
            Self::Chatbot(_) => None,
        }
    }

    /// True when the configured selectors can no longer drive the platform.
    pub fn is_structural(&self) -> bool {
        self.fault().is_some_and(Fault::is_structural)
    }

    /// The conversation the platform reported as gone, if that is the cause.
    pub fn gone_conversation(&self) -> Option<&ConversationId> {
        match self.fault() {
            Some(Fault::ConversationGone(id)) => Some(id),
            _ => None,
        }
    }
}

/// Browser automation errors.
#[derive(Debug, thiserror::Error)]
pub enum WebDriverError {
    #[error("Could not start WebDriver session: {0}")]
    Session(#[from] NewSessionError),

    #[error("WebDriver command failed: {0}")]
    Command(#[from] CmdError),

    #[error("No element matched '{selector}' within {waited:?}")]
    ElementNotFound { selector: String, waited: Duration },
}

impl WebDriverError {
    /// True when the driver itself went away.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Session(_) | Self::Command(CmdError::Lost(_)))
    }

    /// Classify a WebDriver failure for the retry layer.
    ///
    /// Missing elements and rejected selectors mean the configuration no
    /// longer fits the page. Everything else (stale references, dropped
    /// connections, slow pages) may clear up on its own.
    pub fn into_fault(self, operation: &str) -> Fault {
        let reason = self.to_string();
        let structural = match &self {
            Self::ElementNotFound { .. } => true,
            Self::Command(err) => {
                err.is_no_such_element()
                    || matches!(err, CmdError::Standard(wd) if matches!(wd.error, ErrorStatus::InvalidSelector))
            }
            Self::Session(_) => false,
        };
        if structural {
            Fault::structural(operation, reason)
        } else {
            Fault::transient(operation, reason)
        }
    }
}
