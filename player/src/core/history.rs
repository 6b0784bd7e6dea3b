//! Bounded, most-recent-first log of applied actions.
//!
//! Purely observational: it feeds the prompt and the turn logs, never legality.

use std::collections::VecDeque;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnHistoryEntry {
    pub actor: usize,
    pub actor_name: String,
    pub actions: Vec<String>,
    /// RFC 3339 UTC timestamp of the append.
    pub timestamp: String,
}

/// Ring buffer of history entries; the newest entry is first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnHistory {
    entries: VecDeque<TurnHistoryEntry>,
    capacity: usize,
    /// Whether the newest entry still accepts actions from its actor.
    open: bool,
}

impl Default for TurnHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl TurnHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            open: false,
        }
    }

    /// Record actions taken by `actor`, evicting the oldest entry on overflow.
    pub fn append(&mut self, actor: usize, actor_name: &str, actions: Vec<String>) {
        self.entries.push_front(TurnHistoryEntry {
            actor,
            actor_name: actor_name.to_string(),
            actions,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        self.entries.truncate(self.capacity);
        self.open = false;
    }

    /// Record one action summary, extending the newest entry while the same actor
    /// keeps acting within an open turn.
    pub fn record(&mut self, actor: usize, actor_name: &str, action: String) {
        if self.open {
            if let Some(front) = self.entries.front_mut().filter(|e| e.actor == actor) {
                front.actions.push(action);
                return;
            }
        }
        self.append(actor, actor_name, vec![action]);
        self.open = true;
    }

    /// Close the newest entry; the next record starts a new one.
    pub fn close_turn(&mut self) {
        self.open = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &TurnHistoryEntry> {
        self.entries.iter()
    }

    /// The `limit` newest entries.
    pub fn recent(&self, limit: usize) -> Vec<TurnHistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.open = false;
    }
}
