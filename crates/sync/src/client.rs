// Composition root: wires the connection, registry, delivery, and the
// reactive state holders behind one explicitly constructed client.
//
// There is no global instance; hosts construct a `ChatClient`, call
// `init()`, and `dispose()` it when done, so tests can run independent
// clients side by side. Consumers observe inbound activity through a
// broadcast channel; dropping a receiver unsubscribes it.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use banter_common::types::{
    GroupId, Message, MessageEvent, MessageId, PresenceStatus, ServerError, TypingIndicator,
    UserPresence,
};

use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::delivery::DeliveryCoordinator;
use crate::error::{SendError, SyncError};
use crate::presence::PresenceTracker;
use crate::reconcile::{MessageEntry, MessageReconciler};
use crate::rest::MessageApi;
use crate::subscriptions::SubscriptionRegistry;
use crate::token::TokenProvider;
use crate::transport::{ChatTransport, InboundEvent};
use crate::typing::TypingAggregator;

/// How many messages to backfill over REST when entering a group.
const BACKFILL_LIMIT: u32 = 50;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a UI consumer can observe from the sync core.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Message(MessageEvent),
    Typing(TypingIndicator),
    Presence(UserPresence),
    /// Forwarded verbatim from the personal error queue.
    ServerError(ServerError),
    State(ConnectionState),
}

/// The real-time messaging client: one push connection multiplexing all
/// group channels, with per-group state exposed synchronously.
pub struct ChatClient<T: ChatTransport, A: MessageApi> {
    conn: ConnectionManager<T>,
    registry: Arc<SubscriptionRegistry<T>>,
    delivery: Arc<DeliveryCoordinator<T, A>>,
    api: Arc<A>,
    reconciler: Arc<StdMutex<MessageReconciler>>,
    typing: Arc<StdMutex<TypingAggregator>>,
    presence: Arc<StdMutex<PresenceTracker>>,
    events_tx: broadcast::Sender<ChatEvent>,
    active_group: StdMutex<Option<GroupId>>,
    inbound_rx: StdMutex<Option<mpsc::Receiver<InboundEvent>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl<T: ChatTransport, A: MessageApi> ChatClient<T, A> {
    pub fn new(
        config: SyncConfig,
        transport: T,
        api: A,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let api = Arc::new(api);
        let (conn, inbound_rx) = ConnectionManager::new(transport, tokens, config.clone());
        let reconciler = Arc::new(StdMutex::new(MessageReconciler::new(
            config.username.clone(),
            config.recent_window,
        )));
        let typing = Arc::new(StdMutex::new(TypingAggregator::new(
            config.username.clone(),
            config.typing_ttl(),
        )));
        let presence = Arc::new(StdMutex::new(PresenceTracker::new()));
        let registry = Arc::new(SubscriptionRegistry::new(conn.clone()));
        let delivery = Arc::new(DeliveryCoordinator::new(
            conn.clone(),
            Arc::clone(&api),
            Arc::clone(&reconciler),
            config.send_confirm_timeout(),
        ));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            conn,
            registry,
            delivery,
            api,
            reconciler,
            typing,
            presence,
            events_tx,
            active_group: StdMutex::new(None),
            inbound_rx: StdMutex::new(Some(inbound_rx)),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    /// Start the router and resubscribe tasks and establish the connection.
    /// A connect failure is returned, but the reconnect cycle is already
    /// armed and queued subscriptions apply once it succeeds.
    pub async fn init(&self) -> Result<(), SyncError> {
        let inbound = self
            .lock(&self.inbound_rx)
            .take()
            .ok_or(SyncError::AlreadyInitialized)?;
        self.spawn_router(inbound);
        self.spawn_resubscriber();
        self.conn.connect().await
    }

    /// Re-establish the connection manually, e.g. after the automatic
    /// reconnect cycle gave up.
    pub async fn connect(&self) -> Result<(), SyncError> {
        self.conn.connect().await
    }

    /// Tear down the connection, all subscriptions, and background tasks.
    pub async fn dispose(&self) {
        self.conn.disconnect().await;
        self.registry.reset();
        for task in self.lock(&self.tasks).drain(..) {
            task.abort();
        }
        info!("chat client disposed");
    }

    // ── Observation ─────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.conn.watch_state()
    }

    /// Subscribe to everything the core observes. Any number of receivers;
    /// dropping one unsubscribes it.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events_tx.subscribe()
    }

    pub fn active_group(&self) -> Option<GroupId> {
        *self.lock(&self.active_group)
    }

    /// The visible message sequence for a group, oldest first.
    pub fn messages(&self, group_id: GroupId) -> Vec<MessageEntry> {
        self.lock(&self.reconciler).messages(group_id).to_vec()
    }

    /// Who is currently typing in a group, the local user excluded.
    pub fn typing_users(&self, group_id: GroupId) -> Vec<String> {
        self.lock(&self.typing).typing_users(group_id, Instant::now())
    }

    pub fn presence(&self, username: &str) -> UserPresence {
        self.lock(&self.presence).presence(username)
    }

    pub fn online_users(&self) -> Vec<String> {
        self.lock(&self.presence).online_users()
    }

    // ── Group lifecycle ─────────────────────────────────────────────

    /// Make a group the active one: subscribe its channels and backfill
    /// recent history. The previous group's unsubscribe runs in the
    /// background so the switch never blocks on it; its pending sends keep
    /// resolving on their own.
    pub async fn switch_group(&self, group_id: GroupId) {
        let previous = self.lock(&self.active_group).replace(group_id);
        if previous == Some(group_id) {
            return;
        }
        if let Some(previous) = previous {
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                registry.unsubscribe_group(previous).await;
            });
        }
        self.registry.subscribe_group(group_id).await;
        self.backfill_recent(group_id).await;
    }

    /// Leave a group entirely, dropping its local state.
    pub async fn leave_group(&self, group_id: GroupId) {
        {
            let mut active = self.lock(&self.active_group);
            if *active == Some(group_id) {
                *active = None;
            }
        }
        self.registry.unsubscribe_group(group_id).await;
        self.lock(&self.reconciler).clear_group(group_id);
        self.lock(&self.typing).clear_group(group_id);
    }

    // ── Outbound actions ────────────────────────────────────────────

    pub async fn send_message(
        &self,
        group_id: GroupId,
        content: impl Into<String>,
        parent_message_id: Option<MessageId>,
    ) -> Result<Message, SendError> {
        self.delivery.send_message(group_id, content, parent_message_id).await
    }

    pub async fn edit_message(
        &self,
        group_id: GroupId,
        id: MessageId,
        content: impl Into<String>,
    ) -> Result<(), SendError> {
        self.delivery.edit_message(group_id, id, content).await
    }

    pub async fn delete_message(&self, group_id: GroupId, id: MessageId) -> Result<(), SendError> {
        self.delivery.delete_message(group_id, id).await
    }

    pub async fn set_typing(&self, group_id: GroupId, typing: bool) {
        self.delivery.set_typing(group_id, typing).await;
    }

    pub async fn set_presence(&self, status: PresenceStatus) {
        self.delivery.set_presence(status).await;
    }

    // ── Internals ───────────────────────────────────────────────────

    fn spawn_router(&self, mut inbound: mpsc::Receiver<InboundEvent>) {
        let delivery = Arc::clone(&self.delivery);
        let typing = Arc::clone(&self.typing);
        let presence = Arc::clone(&self.presence);
        let events_tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    InboundEvent::Message(event) => {
                        delivery.handle_inbound(event.clone());
                        let _ = events_tx.send(ChatEvent::Message(event));
                    }
                    InboundEvent::Typing(indicator) => {
                        typing
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .on_event(
                                indicator.group_id,
                                &indicator.username,
                                indicator.typing,
                                Instant::now(),
                            );
                        let _ = events_tx.send(ChatEvent::Typing(indicator));
                    }
                    InboundEvent::Presence(update) => {
                        presence
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .on_event(update.clone());
                        let _ = events_tx.send(ChatEvent::Presence(update));
                    }
                    InboundEvent::ServerError(error) => {
                        warn!(code = %error.code, "server reported error");
                        let _ = events_tx.send(ChatEvent::ServerError(error));
                    }
                    InboundEvent::Pong => {}
                }
            }
        });
        self.lock(&self.tasks).push(task);
    }

    fn spawn_resubscriber(&self) {
        let registry = Arc::clone(&self.registry);
        let events_tx = self.events_tx.clone();
        let mut state_rx = self.conn.watch_state();
        let task = tokio::spawn(async move {
            loop {
                if state_rx.changed().await.is_err() {
                    return;
                }
                let state = *state_rx.borrow_and_update();
                let _ = events_tx.send(ChatEvent::State(state));
                match state {
                    ConnectionState::Connected => registry.on_connected().await,
                    ConnectionState::Reconnecting | ConnectionState::Disconnected => {
                        registry.on_connection_lost();
                    }
                    ConnectionState::Connecting => {}
                }
            }
        });
        self.lock(&self.tasks).push(task);
    }

    async fn backfill_recent(&self, group_id: GroupId) {
        match self.api.recent_messages(group_id, BACKFILL_LIMIT).await {
            Ok(history) => {
                self.lock(&self.reconciler).backfill(group_id, history);
            }
            Err(error) => {
                // History is an enhancement; the live channel still works.
                warn!(%error, group_id, "recent-message backfill failed");
            }
        }
    }

    fn lock<'a, V>(&self, mutex: &'a StdMutex<V>) -> std::sync::MutexGuard<'a, V> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: ChatTransport, A: MessageApi> Drop for ChatClient<T, A> {
    fn drop(&mut self) {
        for task in self.lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}
