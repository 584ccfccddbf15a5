//! Operator core: continuous conversation handling for one platform.
//!
//! Core components:
//! - `state`: Operator state machine (Initializing → Authenticating → Idle ⇄ Processing)
//! - `scheduler`: Round-robin rotation with unread prioritization
//! - `registry`: Last-seen state per discovered conversation
//! - `retry`: Transient/structural fault classification and bounded retry
//! - `pipeline`: Read → generate → send for one conversation
//! - `clock`: Injectable time source
//! - `control`: The loop that ties them together

pub mod clock;
pub mod control;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use clock::{Clock, ManualClock, TokioClock};
pub use control::{
    Operator, OperatorDeps, RecalibrationReport, RunOutcome, STARTUP_FAILURE_EXIT_CODE,
};
pub use pipeline::{ConversationPipeline, PipelineOutcome, ProcessedConversation};
pub use registry::ConversationRegistry;
pub use retry::RetryPolicy;
pub use scheduler::RoundRobinScheduler;
pub use state::{OperatorState, StateTracker};
