//! Chat channel membership and history

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use echat_protocol::ChatContent;

/// Number of chat lines replayed to a newcomer
pub const LATEST_MSG_COUNT: usize = 50;

/// A named room: members plus a ring of recent messages
#[derive(Debug)]
pub struct Channel {
    name: String,
    members: BTreeMap<String, Instant>,
    history: VecDeque<ChatContent>,
    message_count: u64,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
            history: VecDeque::with_capacity(LATEST_MSG_COUNT),
            message_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_member(&self, username: &str) -> bool {
        self.members.contains_key(username)
    }

    /// Member names in sorted order
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn joined_at(&self, username: &str) -> Option<Instant> {
        self.members.get(username).copied()
    }

    /// Returns false if already a member
    pub fn add_member(&mut self, username: &str) -> bool {
        if self.is_member(username) {
            return false;
        }
        self.members.insert(username.to_string(), Instant::now());
        true
    }

    /// Returns false if not a member
    pub fn remove_member(&mut self, username: &str) -> bool {
        self.members.remove(username).is_some()
    }

    /// Append a line, evicting the oldest once the ring is full
    pub fn record(&mut self, user: &str, words: &str) {
        if self.history.len() == LATEST_MSG_COUNT {
            self.history.pop_front();
        }
        self.history.push_back(ChatContent {
            user: user.to_string(),
            words: words.to_string(),
        });
        self.message_count += 1;
    }

    /// Recent history, oldest first
    pub fn history(&self) -> Vec<ChatContent> {
        self.history.iter().cloned().collect()
    }

    /// Total messages ever recorded
    pub fn message_count(&self) -> u64 {
        self.message_count
    }
}
