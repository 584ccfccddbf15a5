//! Operator control loop: the state machine that drives polling,
//! scheduling, processing and escalation.
//!
//! One [`Operator::step`] call performs exactly one state transition, so the
//! loop can be driven cycle by cycle in tests. [`Operator::run`] steps until
//! a terminal result is reached.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chatbot::Chatbot;
use crate::config::OperatorConfig;
use crate::conversation::ConversationId;
use crate::error::{AuthError, ConfigError, Fault};
use crate::operator::clock::Clock;
use crate::operator::pipeline::ConversationPipeline;
use crate::operator::registry::ConversationRegistry;
use crate::operator::retry::{RetryPolicy, bounded};
use crate::operator::scheduler::RoundRobinScheduler;
use crate::operator::state::{OperatorState, StateTracker, StateTransition};
use crate::surface::{
    Authenticator, ConversationPoller, ConversationReader, MessageSender, PollResult,
};

/// Collaborators the operator drives.
///
/// Bundles the external capabilities to keep the constructor short.
pub struct OperatorDeps {
    pub authenticator: Arc<dyn Authenticator>,
    pub poller: Arc<dyn ConversationPoller>,
    pub reader: Arc<dyn ConversationReader>,
    pub chatbot: Arc<dyn Chatbot>,
    pub sender: Arc<dyn MessageSender>,
    pub clock: Arc<dyn Clock>,
}

/// Why the operator halted for recalibration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecalibrationReport {
    pub platform: String,
    /// UI step that kept failing (poll, read, send).
    pub operation: String,
    pub reason: String,
    /// Conversation being processed when the fault surfaced, if any.
    pub conversation: Option<ConversationId>,
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for RecalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Selectors for '{}' no longer match the platform UI ({} step: {})",
            self.platform, self.operation, self.reason
        )?;
        if let Some(id) = &self.conversation {
            write!(f, " while processing {id}")?;
        }
        write!(
            f,
            ". Regenerate the platform configuration with the analyzer before restarting."
        )
    }
}

/// Exit code when the operator fails before the loop starts.
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 3;

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Stopped by the caller.
    Cancelled,
    /// Halted on a structural fault.
    RecalibrationRequired(RecalibrationReport),
    /// Login failed; the loop never started cycling.
    AuthenticationFailed(AuthError),
}

impl RunOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 0,
            Self::RecalibrationRequired(_) => 1,
            Self::AuthenticationFailed(_) => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::RecalibrationRequired(_) => "recalibration_required",
            Self::AuthenticationFailed(_) => "authentication_failed",
        }
    }
}

/// The continuous operation engine for one platform.
pub struct Operator {
    platform: String,
    config: OperatorConfig,
    authenticator: Arc<dyn Authenticator>,
    poller: Arc<dyn ConversationPoller>,
    clock: Arc<dyn Clock>,
    pipeline: ConversationPipeline,
    retry: RetryPolicy,
    registry: ConversationRegistry,
    scheduler: RoundRobinScheduler,
    tracker: StateTracker,
    /// Conversation selected in `Idle`, consumed by `Processing`.
    current: Option<ConversationId>,
    report: Option<RecalibrationReport>,
    outcome: Option<RunOutcome>,
    cycles: u64,
}

impl Operator {
    pub fn new(
        platform: impl Into<String>,
        config: OperatorConfig,
        deps: OperatorDeps,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let pipeline = ConversationPipeline::new(deps.reader, deps.chatbot, deps.sender, &config);

        Ok(Self {
            platform: platform.into(),
            retry: RetryPolicy::new(config.max_attempts),
            config,
            authenticator: deps.authenticator,
            poller: deps.poller,
            clock: deps.clock,
            pipeline,
            registry: ConversationRegistry::new(),
            scheduler: RoundRobinScheduler::new(),
            tracker: StateTracker::new(),
            current: None,
            report: None,
            outcome: None,
            cycles: 0,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> OperatorState {
        self.tracker.state()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        self.tracker.transitions()
    }

    pub fn scheduler(&self) -> &RoundRobinScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    /// Number of poll cycles started.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Step the state machine until it terminates.
    pub async fn run(&mut self, cancel: &CancellationToken) -> RunOutcome {
        info!(platform = %self.platform, "Starting operator");

        loop {
            if let Some(outcome) = self.step(cancel).await {
                info!(
                    platform = %self.platform,
                    outcome = outcome.label(),
                    cycles = self.cycles,
                    "Operator stopped"
                );
                return outcome;
            }
        }
    }

    /// Perform one state transition. Returns the outcome once terminated.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Option<RunOutcome> {
        let state = self.tracker.state();

        if cancel.is_cancelled() && state.is_runnable() {
            info!(state = %state, "Cancellation requested, stopping operator");
            return Some(self.terminate(RunOutcome::Cancelled, "cancelled"));
        }

        match state {
            OperatorState::Initializing => self.initialize(),
            OperatorState::Authenticating => self.authenticate().await,
            OperatorState::Idle => self.idle(cancel).await,
            OperatorState::Processing => self.process(cancel).await,
            OperatorState::AwaitingRecalibration => Some(self.halt_for_recalibration()),
            OperatorState::Terminated => Some(self.outcome.clone().unwrap_or(RunOutcome::Cancelled)),
        }
    }

    // ── States ──────────────────────────────────────────────────────

    fn initialize(&mut self) -> Option<RunOutcome> {
        info!(
            platform = %self.platform,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            message_cap = self.config.message_cap,
            max_attempts = self.config.max_attempts,
            "Operator initialized"
        );
        self.transition(OperatorState::Authenticating, "initialized");
        None
    }

    async fn authenticate(&mut self) -> Option<RunOutcome> {
        info!(platform = %self.platform, "Authenticating");

        match self
            .authenticator
            .ensure_authenticated(self.config.manual_login_wait)
            .await
        {
            Ok(()) => {
                info!(platform = %self.platform, "Authenticated");
                self.transition(OperatorState::Idle, "authenticated");
                None
            }
            Err(e) => {
                error!(platform = %self.platform, error = %e, "Authentication failed");
                Some(self.terminate(
                    RunOutcome::AuthenticationFailed(e),
                    "authentication failed",
                ))
            }
        }
    }

    async fn idle(&mut self, cancel: &CancellationToken) -> Option<RunOutcome> {
        self.cycles += 1;
        debug!(cycle = self.cycles, "Starting cycle");

        let poll_timeout = self.config.timeouts.poll;
        let polled = self
            .retry
            .run("poll", |_| bounded("poll", poll_timeout, self.poller.poll_once()))
            .await;

        match polled {
            Ok(result) => self.apply_poll(&result),
            Err(Fault::ConversationGone(id)) => self.drop_conversation(&id),
            Err(fault) => {
                self.escalate(&fault, None);
                return None;
            }
        }

        match self.scheduler.next() {
            Some(id) => {
                self.transition(OperatorState::Processing, format!("serving {id}"));
                self.current = Some(id);
            }
            None => {
                info!(
                    seconds = self.config.poll_interval.as_secs(),
                    "No active conversations, sleeping"
                );
                self.pause(self.config.poll_interval, cancel).await;
                self.transition(OperatorState::Idle, "poll interval elapsed");
            }
        }
        None
    }

    async fn process(&mut self, cancel: &CancellationToken) -> Option<RunOutcome> {
        let Some(id) = self.current.take() else {
            warn!("Processing entered without a conversation");
            self.transition(OperatorState::Idle, "nothing to process");
            return None;
        };

        match self.pipeline.process(&id).await {
            Ok(processed) => {
                self.registry.mark_processed(&id, self.clock.now());
                debug!(
                    conversation = %id,
                    outcome = processed.outcome.label(),
                    "Pipeline finished"
                );
            }
            Err(err) if err.is_structural() => {
                error!(conversation = %id, error = %err, "Structural fault while processing");
                if let Some(fault) = err.fault() {
                    self.escalate(fault, Some(id));
                }
                return None;
            }
            Err(err) => {
                if let Some(gone) = err.gone_conversation() {
                    let gone = gone.clone();
                    self.drop_conversation(&gone);
                } else {
                    // Stays queued; the next rotation tries again.
                    warn!(conversation = %id, error = %err, "Processing failed");
                }
            }
        }

        self.pause(self.config.pacing_delay, cancel).await;
        self.transition(OperatorState::Idle, format!("finished {id}"));
        None
    }

    fn halt_for_recalibration(&mut self) -> RunOutcome {
        let report = self.report.clone().unwrap_or_else(|| RecalibrationReport {
            platform: self.platform.clone(),
            operation: "unknown".into(),
            reason: "structural fault".into(),
            conversation: None,
            detected_at: self.clock.now(),
        });

        error!(platform = %report.platform, "{report}");
        self.terminate(
            RunOutcome::RecalibrationRequired(report),
            "recalibration required",
        )
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn apply_poll(&mut self, poll: &PollResult) {
        if poll.is_empty() {
            debug!(queued = self.scheduler.len(), "Poll found no changes");
            return;
        }
        self.registry.observe(poll, self.clock.now());

        for id in poll.new_or_updated.iter().chain(poll.unread.iter()) {
            self.scheduler.add(id.clone());
        }
        for id in &poll.gone {
            self.scheduler.remove(id);
        }
        if !poll.unread.is_empty() {
            self.scheduler.prioritize_unread(&poll.unread);
        }

        debug!(
            queued = self.scheduler.len(),
            unread = poll.unread.len(),
            gone = poll.gone.len(),
            "Poll applied"
        );
    }

    fn drop_conversation(&mut self, id: &ConversationId) {
        info!(conversation = %id, "Conversation gone, removing from rotation");
        self.scheduler.remove(id);
        self.registry.forget(id);
    }

    fn escalate(&mut self, fault: &Fault, conversation: Option<ConversationId>) {
        let report = RecalibrationReport {
            platform: self.platform.clone(),
            operation: fault.operation().unwrap_or("unknown").to_string(),
            reason: fault.to_string(),
            conversation,
            detected_at: self.clock.now(),
        };
        self.report = Some(report);
        self.transition(OperatorState::AwaitingRecalibration, "structural fault");
    }

    fn terminate(&mut self, outcome: RunOutcome, reason: &str) -> RunOutcome {
        self.transition(OperatorState::Terminated, reason);
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Sleep on the injected clock, waking early on cancellation.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) {
        if duration.is_zero() || cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => debug!("Pause interrupted by cancellation"),
            _ = self.clock.sleep(duration) => {}
        }
    }

    fn transition(&mut self, to: OperatorState, reason: impl Into<String>) {
        let from = self.tracker.state();
        let at = self.clock.now();
        match self.tracker.transition_to(to, Some(reason.into()), at) {
            Ok(()) => debug!(%from, %to, "Operator state changed"),
            Err(e) => {
                error!(error = %e, "Rejected operator transition");
                debug_assert!(false, "{e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::chatbot::EchoChatbot;
    use crate::conversation::Conversation;
    use crate::operator::clock::ManualClock;

    struct Auth(bool);

    #[async_trait]
    impl Authenticator for Auth {
        async fn ensure_authenticated(&self, max_wait: Duration) -> Result<(), AuthError> {
            if self.0 {
                Ok(())
            } else {
                Err(AuthError::TimedOut {
                    platform: "Test".into(),
                    waited: max_wait,
                })
            }
        }
    }

    struct EmptySurface;

    #[async_trait]
    impl ConversationPoller for EmptySurface {
        async fn poll_once(&self) -> Result<PollResult, Fault> {
            Ok(PollResult::default())
        }
    }

    #[async_trait]
    impl ConversationReader for EmptySurface {
        async fn read(&self, id: &ConversationId) -> Result<Conversation, Fault> {
            Ok(Conversation::new(id.clone(), "Test"))
        }
    }

    #[async_trait]
    impl MessageSender for EmptySurface {
        async fn prepare(&self, _text: &str) -> Result<(), Fault> {
            Ok(())
        }

        async fn commit(&self) -> Result<(), Fault> {
            Ok(())
        }
    }

    fn operator(auth_ok: bool, clock: Arc<ManualClock>) -> Operator {
        let deps = OperatorDeps {
            authenticator: Arc::new(Auth(auth_ok)),
            poller: Arc::new(EmptySurface),
            reader: Arc::new(EmptySurface),
            chatbot: Arc::new(EchoChatbot),
            sender: Arc::new(EmptySurface),
            clock,
        };
        Operator::new("Test", OperatorConfig::default(), deps).unwrap()
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let mut op = operator(true, Arc::new(ManualClock::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = op.run(&cancel).await;
        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(op.state(), OperatorState::Terminated);
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let mut op = operator(false, Arc::new(ManualClock::default()));
        let outcome = op.run(&CancellationToken::new()).await;

        assert!(matches!(outcome, RunOutcome::AuthenticationFailed(_)));
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(op.cycles(), 0);
    }

    #[tokio::test]
    async fn empty_queue_sleeps_poll_interval() {
        let clock = Arc::new(ManualClock::default());
        let mut op = operator(true, clock.clone());
        let cancel = CancellationToken::new();

        // Initializing → Authenticating → Idle → Idle
        for _ in 0..3 {
            assert!(op.step(&cancel).await.is_none());
        }
        assert_eq!(op.state(), OperatorState::Idle);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);

        cancel.cancel();
        assert!(matches!(op.step(&cancel).await, Some(RunOutcome::Cancelled)));
        // Further steps keep reporting the same outcome.
        assert!(matches!(op.step(&cancel).await, Some(RunOutcome::Cancelled)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let deps = OperatorDeps {
            authenticator: Arc::new(Auth(true)),
            poller: Arc::new(EmptySurface),
            reader: Arc::new(EmptySurface),
            chatbot: Arc::new(EchoChatbot),
            sender: Arc::new(EmptySurface),
            clock: Arc::new(ManualClock::default()),
        };
        let config = OperatorConfig {
            message_cap: 0,
            ..OperatorConfig::default()
        };
        assert!(Operator::new("Test", config, deps).is_err());
    }

    #[test]
    fn report_names_platform_and_remedy() {
        let report = RecalibrationReport {
            platform: "WhatsApp Web".into(),
            operation: "read".into(),
            reason: "no such element".into(),
            conversation: Some("conv1".into()),
            detected_at: Utc::now(),
        };
        let text = report.to_string();
        assert!(text.contains("WhatsApp Web"));
        assert!(text.contains("conv1"));
        assert!(text.contains("Regenerate"));
        assert_eq!(RunOutcome::RecalibrationRequired(report).exit_code(), 1);
    }

    #[test]
    fn startup_failure_code_is_distinct() {
        let auth = AuthError::Rejected {
            platform: "Test".into(),
            reason: "bad password".into(),
        };
        let report = RecalibrationReport {
            platform: "Test".into(),
            operation: "poll".into(),
            reason: "gone".into(),
            conversation: None,
            detected_at: Utc::now(),
        };
        for outcome in [
            RunOutcome::Cancelled,
            RunOutcome::RecalibrationRequired(report),
            RunOutcome::AuthenticationFailed(auth),
        ] {
            assert_ne!(outcome.exit_code(), STARTUP_FAILURE_EXIT_CODE);
        }
    }
}
