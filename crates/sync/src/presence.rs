// Last-known presence per user.
//
// Last-write-wins keyed by event receipt order, not by the embedded
// timestamp; there is no cross-node clock assumption.

use std::collections::HashMap;

use banter_common::types::{PresenceStatus, UserPresence};

/// Records the most recently received presence event per user.
#[derive(Default)]
pub struct PresenceTracker {
    users: HashMap<String, UserPresence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event(&mut self, presence: UserPresence) {
        self.users.insert(presence.username.clone(), presence);
    }

    /// Presence for a user. Users with no recorded event report `Unknown`,
    /// which is distinct from `Offline`.
    pub fn presence(&self, username: &str) -> UserPresence {
        self.users.get(username).cloned().unwrap_or_else(|| UserPresence {
            username: username.to_string(),
            status: PresenceStatus::Unknown,
            last_seen: None,
        })
    }

    /// Usernames currently reported online, sorted.
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .users
            .values()
            .filter(|presence| presence.status == PresenceStatus::Online)
            .map(|presence| presence.username.clone())
            .collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(username: &str, status: PresenceStatus) -> UserPresence {
        UserPresence {
            username: username.to_string(),
            status,
            last_seen: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn unknown_user_reports_unknown_not_offline() {
        let tracker = PresenceTracker::new();
        let presence = tracker.presence("ghost");
        assert_eq!(presence.status, PresenceStatus::Unknown);
        assert_eq!(presence.last_seen, None);
    }

    #[test]
    fn last_received_event_wins() {
        let mut tracker = PresenceTracker::new();
        tracker.on_event(event("ann", PresenceStatus::Online));
        tracker.on_event(event("ann", PresenceStatus::Away));
        assert_eq!(tracker.presence("ann").status, PresenceStatus::Away);
    }

    #[test]
    fn offline_is_recorded_distinctly_from_unknown() {
        let mut tracker = PresenceTracker::new();
        tracker.on_event(event("ann", PresenceStatus::Offline));
        assert_eq!(tracker.presence("ann").status, PresenceStatus::Offline);
        assert_eq!(tracker.presence("bob").status, PresenceStatus::Unknown);
    }

    #[test]
    fn online_users_sorted() {
        let mut tracker = PresenceTracker::new();
        tracker.on_event(event("zoe", PresenceStatus::Online));
        tracker.on_event(event("ann", PresenceStatus::Online));
        tracker.on_event(event("bob", PresenceStatus::Away));
        assert_eq!(tracker.online_users(), vec!["ann", "zoe"]);
    }
}
