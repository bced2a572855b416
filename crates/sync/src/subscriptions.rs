// Subscription bookkeeping across group switches and reconnects.
//
// The registry tracks two things: the desired set (which groups the client
// wants) and the active map (which topics are actually subscribed on the
// current connection, with their transport handles). Handles die with the
// connection; the desired set does not. This is the only component that
// issues subscribe/unsubscribe calls against the transport.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex as StdMutex;

use tracing::{debug, warn};

use banter_common::protocol::Topic;
use banter_common::types::GroupId;

use crate::connection::{ConnectionManager, ConnectionState};
use crate::transport::{ChatTransport, SubscriptionHandle};

#[derive(Default)]
struct RegistryState {
    desired_groups: BTreeSet<GroupId>,
    active: HashMap<Topic, SubscriptionHandle>,
}

/// Tracks which per-group channels are subscribed and re-establishes them
/// idempotently after a reconnect.
pub struct SubscriptionRegistry<T: ChatTransport> {
    conn: ConnectionManager<T>,
    state: StdMutex<RegistryState>,
}

impl<T: ChatTransport> SubscriptionRegistry<T> {
    pub fn new(conn: ConnectionManager<T>) -> Self {
        Self { conn, state: StdMutex::new(RegistryState::default()) }
    }

    /// Ensure all of a group's channels (plus the connection-scoped ones)
    /// are subscribed. Idempotent; while not connected the intent is queued
    /// and applied on the next `Connected` transition.
    pub async fn subscribe_group(&self, group_id: GroupId) {
        self.lock().desired_groups.insert(group_id);
        if self.conn.state() != ConnectionState::Connected {
            debug!(group_id, "subscription queued until connected");
            return;
        }
        for topic in group_topics(group_id).into_iter().chain(connection_topics()) {
            self.ensure_subscribed(topic).await;
        }
    }

    /// Remove a group's channel subscriptions. Presence and the error queue
    /// are connection-scoped and stay up until full disconnect.
    pub async fn unsubscribe_group(&self, group_id: GroupId) {
        let handles: Vec<(Topic, SubscriptionHandle)> = {
            let mut state = self.lock();
            state.desired_groups.remove(&group_id);
            group_topics(group_id)
                .into_iter()
                .filter_map(|topic| state.active.remove(&topic).map(|handle| (topic, handle)))
                .collect()
        };
        for (topic, handle) in handles {
            if let Err(error) = self.conn.unsubscribe(handle).await {
                debug!(%error, ?topic, "unsubscribe failed; handle dies with the connection");
            }
        }
    }

    /// Re-establish every desired subscription on a fresh connection. The
    /// previous connection's handles are invalid and are discarded first.
    pub async fn on_connected(&self) {
        let topics: Vec<Topic> = {
            let mut state = self.lock();
            state.active.clear();
            connection_topics()
                .into_iter()
                .chain(state.desired_groups.iter().flat_map(|g| group_topics(*g)))
                .collect()
        };
        for topic in topics {
            self.ensure_subscribed(topic).await;
        }
    }

    /// Transport handles are invalid once the connection drops.
    pub fn on_connection_lost(&self) {
        self.lock().active.clear();
    }

    /// Full teardown on deliberate disconnect: desired set included.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.desired_groups.clear();
        state.active.clear();
    }

    pub fn desired_groups(&self) -> Vec<GroupId> {
        self.lock().desired_groups.iter().copied().collect()
    }

    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.lock().active.keys().copied().collect();
        topics.sort();
        topics
    }

    async fn ensure_subscribed(&self, topic: Topic) {
        if self.lock().active.contains_key(&topic) {
            return;
        }
        match self.conn.subscribe(topic).await {
            Ok(handle) => {
                self.lock().active.insert(topic, handle);
            }
            Err(error) => {
                // Not retried here; the next reconnect cycle re-issues it.
                warn!(%error, ?topic, "subscribe failed");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn group_topics(group_id: GroupId) -> [Topic; 2] {
    [Topic::GroupMessages(group_id), Topic::GroupTyping(group_id)]
}

fn connection_topics() -> [Topic; 2] {
    [Topic::Presence, Topic::Errors]
}
