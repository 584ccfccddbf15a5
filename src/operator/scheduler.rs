//! Round-robin rotation over known conversations.
//!
//! The queue keeps insertion order and a cursor pointing at the next
//! conversation to serve. Calling [`RoundRobinScheduler::next`] `len` times
//! with no mutation in between visits every conversation exactly once.

use serde::Serialize;
use tracing::{debug, info};

use crate::conversation::ConversationId;

/// Serializable snapshot of the rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub cursor: usize,
    pub conversations: Vec<ConversationId>,
}

/// Fair rotation with unread prioritisation.
#[derive(Debug, Default)]
pub struct RoundRobinScheduler {
    queue: Vec<ConversationId>,
    cursor: usize,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless it is already queued. Returns true if it was added.
    pub fn add(&mut self, id: ConversationId) -> bool {
        if self.contains(&id) {
            return false;
        }
        info!(conversation = %id, "Added conversation to queue");
        self.queue.push(id);
        self.debug_check();
        true
    }

    /// Remove `id` wherever it is. Returns true if it was queued.
    pub fn remove(&mut self, id: &ConversationId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.queue.remove(index);

        if self.queue.is_empty() {
            self.cursor = 0;
        } else {
            if index < self.cursor {
                self.cursor -= 1;
            }
            if self.cursor >= self.queue.len() {
                self.cursor = 0;
            }
        }

        info!(conversation = %id, "Removed conversation from queue");
        self.debug_check();
        true
    }

    /// Next conversation in rotation, or `None` when the queue is empty.
    pub fn next(&mut self) -> Option<ConversationId> {
        if self.queue.is_empty() {
            return None;
        }
        let id = self.queue[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.queue.len();
        debug!(conversation = %id, cursor = self.cursor, "Next conversation");
        Some(id)
    }

    /// Move the queued ids in `ids` to the front, in the given order.
    ///
    /// Untouched ids keep their relative order. If anything moved, the next
    /// call to `next()` returns the first prioritised id. Returns how many
    /// ids were moved.
    pub fn prioritize_unread(&mut self, ids: &[ConversationId]) -> usize {
        let mut front: Vec<ConversationId> = Vec::with_capacity(ids.len());
        for id in ids {
            if self.contains(id) && !front.contains(id) {
                front.push(id.clone());
            }
        }
        if front.is_empty() {
            return 0;
        }

        let rest: Vec<ConversationId> = std::mem::take(&mut self.queue)
            .into_iter()
            .filter(|id| !front.contains(id))
            .collect();
        let moved = front.len();
        front.extend(rest);
        self.queue = front;
        self.cursor = 0;

        info!(count = moved, "Prioritized unread conversations");
        self.debug_check();
        moved
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.queue.contains(id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue contents in rotation storage order.
    pub fn queue(&self) -> &[ConversationId] {
        &self.queue
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            queue_length: self.queue.len(),
            cursor: self.cursor,
            conversations: self.queue.clone(),
        }
    }

    fn position(&self, id: &ConversationId) -> Option<usize> {
        self.queue.iter().position(|queued| queued == id)
    }

    fn debug_check(&self) {
        debug_assert!(
            (self.queue.is_empty() && self.cursor == 0) || self.cursor < self.queue.len(),
            "cursor {} out of range for queue of {}",
            self.cursor,
            self.queue.len()
        );
    }
}
