// "Who is typing" aggregation with TTL expiry.
//
// Entries expire TYPING_TTL after the last refresh; senders re-send their
// indicator more often than that, so one dropped refresh does not flicker.
// Expired entries are swept lazily on read; there is no timer task.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use banter_common::types::GroupId;

/// Default time-to-live for a typing indicator.
pub const TYPING_TTL: Duration = Duration::from_secs(3);

/// Aggregates per-user typing events into a per-group set.
pub struct TypingAggregator {
    local_username: String,
    ttl: Duration,
    expires: HashMap<(GroupId, String), Instant>,
}

impl TypingAggregator {
    pub fn new(local_username: impl Into<String>, ttl: Duration) -> Self {
        Self { local_username: local_username.into(), ttl, expires: HashMap::new() }
    }

    /// Record a typing start (set/refresh expiry) or stop (remove).
    pub fn on_event(&mut self, group_id: GroupId, username: &str, typing: bool, now: Instant) {
        if typing {
            self.expires.insert((group_id, username.to_string()), now + self.ttl);
        } else {
            self.expires.remove(&(group_id, username.to_string()));
        }
    }

    /// Currently typing users in a group, sorted. Sweeps expired entries
    /// first; the local user is excluded even if an echo was received.
    pub fn typing_users(&mut self, group_id: GroupId, now: Instant) -> Vec<String> {
        self.expires.retain(|_, expiry| *expiry > now);
        let mut users: Vec<String> = self
            .expires
            .keys()
            .filter(|(g, user)| *g == group_id && *user != self.local_username)
            .map(|(_, user)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// Drop all entries for a group (on leave).
    pub fn clear_group(&mut self, group_id: GroupId) {
        self.expires.retain(|(g, _), _| *g != group_id);
    }
}
