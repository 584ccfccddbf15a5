//! Operator state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorState {
    /// Configuration and collaborators are being checked.
    Initializing,
    /// Waiting for the platform login.
    Authenticating,
    /// Polling and picking the next conversation.
    Idle,
    /// Running the pipeline for one conversation.
    Processing,
    /// Selectors no longer match the platform; halted until recalibrated.
    AwaitingRecalibration,
    /// The loop has stopped.
    Terminated,
}

impl OperatorState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: OperatorState) -> bool {
        use OperatorState::*;

        matches!(
            (self, target),
            // From Initializing
            (Initializing, Authenticating) | (Initializing, Terminated) |
            // From Authenticating
            (Authenticating, Idle) | (Authenticating, Terminated) |
            // From Idle (poll escalation can halt before any processing)
            (Idle, Idle) | (Idle, Processing) |
            (Idle, AwaitingRecalibration) | (Idle, Terminated) |
            // From Processing
            (Processing, Idle) | (Processing, AwaitingRecalibration) |
            (Processing, Terminated) |
            // From AwaitingRecalibration
            (AwaitingRecalibration, Terminated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// True while the loop may still issue cycles.
    pub fn is_runnable(&self) -> bool {
        !matches!(self, Self::AwaitingRecalibration | Self::Terminated)
    }
}

impl std::fmt::Display for OperatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Authenticating => "authenticating",
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::AwaitingRecalibration => "awaiting_recalibration",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: OperatorState,
    pub to: OperatorState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Current state plus a bounded transition history.
#[derive(Debug, Clone, Serialize)]
pub struct StateTracker {
    state: OperatorState,
    transitions: Vec<StateTransition>,
}

/// Cap on recorded transitions; an operator runs indefinitely.
const MAX_TRANSITIONS: usize = 200;

impl StateTracker {
    pub fn new() -> Self {
        Self {
            state: OperatorState::Initializing,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Transition to a new state.
    pub fn transition_to(
        &mut self,
        new_state: OperatorState,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), String> {
        if !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }

        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: at,
            reason,
        });

        if self.transitions.len() > MAX_TRANSITIONS {
            let drain_count = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(..drain_count);
        }

        self.state = new_state;
        Ok(())
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_valid() {
        use OperatorState::*;
        assert!(Initializing.can_transition_to(Authenticating));
        assert!(Authenticating.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Processing));
        assert!(Idle.can_transition_to(Idle));
        assert!(Processing.can_transition_to(Idle));
        assert!(Processing.can_transition_to(AwaitingRecalibration));
        assert!(AwaitingRecalibration.can_transition_to(Terminated));
    }

    #[test]
    fn state_transitions_invalid() {
        use OperatorState::*;
        assert!(!Initializing.can_transition_to(Processing));
        assert!(!Authenticating.can_transition_to(Authenticating));
        assert!(!AwaitingRecalibration.can_transition_to(Idle));
        assert!(!Terminated.can_transition_to(Idle));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn runnable_states() {
        assert!(OperatorState::Idle.is_runnable());
        assert!(!OperatorState::AwaitingRecalibration.is_runnable());
        assert!(OperatorState::Terminated.is_terminal());
        assert!(!OperatorState::AwaitingRecalibration.is_terminal());
    }

    #[test]
    fn tracker_records_transitions() {
        let mut tracker = StateTracker::new();
        tracker
            .transition_to(OperatorState::Authenticating, None, Utc::now())
            .unwrap();
        tracker
            .transition_to(OperatorState::Idle, Some("logged in".into()), Utc::now())
            .unwrap();
        assert_eq!(tracker.state(), OperatorState::Idle);
        assert_eq!(tracker.transitions().len(), 2);
        assert_eq!(tracker.transitions()[1].reason.as_deref(), Some("logged in"));

        let err = tracker
            .transition_to(OperatorState::Authenticating, None, Utc::now())
            .unwrap_err();
        assert!(err.contains("idle"));
    }

    #[test]
    fn transition_history_capped() {
        let mut tracker = StateTracker::new();
        tracker.transition_to(OperatorState::Authenticating, None, Utc::now()).unwrap();
        tracker.transition_to(OperatorState::Idle, None, Utc::now()).unwrap();
        for _ in 0..250 {
            tracker.transition_to(OperatorState::Processing, None, Utc::now()).unwrap();
            tracker.transition_to(OperatorState::Idle, None, Utc::now()).unwrap();
        }
        assert!(tracker.transitions().len() <= 200);
    }

    #[test]
    fn state_display_and_serde() {
        assert_eq!(
            OperatorState::AwaitingRecalibration.to_string(),
            "awaiting_recalibration"
        );
        let json = serde_json::to_string(&OperatorState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
