//! In-memory conversation registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::conversation::ConversationId;
use crate::surface::PollResult;

/// Transient per-conversation state, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    pub id: ConversationId,
    pub has_unread: bool,
    pub last_seen_at: DateTime<Utc>,
}

/// Known conversations keyed by id.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    entries: HashMap<ConversationId, ConversationState>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a poll result into the registry. Returns ids sighted for the first time.
    ///
    /// Every id in `new_or_updated` or `unread` is refreshed. Only ids in
    /// `unread` get the unread flag set, and ids in `gone` are dropped.
    pub fn observe(&mut self, poll: &PollResult, now: DateTime<Utc>) -> Vec<ConversationId> {
        let mut sighted = Vec::new();

        for id in poll.new_or_updated.iter().chain(poll.unread.iter()) {
            let entry = self.entries.entry(id.clone()).or_insert_with(|| {
                sighted.push(id.clone());
                ConversationState {
                    id: id.clone(),
                    has_unread: false,
                    last_seen_at: now,
                }
            });
            entry.last_seen_at = now;
        }

        for id in &poll.unread {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.has_unread = true;
            }
        }

        for id in &poll.gone {
            self.forget(id);
        }

        if !sighted.is_empty() {
            debug!(count = sighted.len(), "New conversations sighted");
        }
        sighted
    }

    /// Record a successful processing cycle.
    pub fn mark_processed(&mut self, id: &ConversationId, now: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.has_unread = false;
            entry.last_seen_at = now;
        }
    }

    pub fn forget(&mut self, id: &ConversationId) -> Option<ConversationState> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &ConversationId) -> Option<&ConversationState> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
