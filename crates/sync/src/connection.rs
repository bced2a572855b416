// Push-channel lifecycle: connect, authenticate, heartbeat, reconnect.
//
// The manager owns the transport connection and is the only writer of
// `ConnectionState`. Consumers observe transitions through a watch channel;
// connection failures are never thrown at them. Reconnection backoff is a
// pure function of the consecutive-failure count (see `backoff`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use banter_common::protocol::Topic;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::token::TokenProvider;
use crate::transport::{
    ChatTransport, InboundEvent, OutboundFrame, SubscriptionHandle, TransportConnection,
    TransportSink,
};

/// Current state of the push connection. Owned exclusively by
/// `ConnectionManager`; all other components only read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Capacity of the inbound event channel between the reader task and the
/// client router.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

struct Inner<T: ChatTransport> {
    transport: T,
    tokens: Arc<dyn TokenProvider>,
    config: SyncConfig,
    state_tx: watch::Sender<ConnectionState>,
    sink: Mutex<Option<Box<dyn TransportSink>>>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    /// Serializes dial attempts so concurrent `connect()` calls share one.
    connect_gate: Mutex<()>,
    /// Incremented per established connection; stale reader/heartbeat tasks
    /// recognize themselves by a mismatched epoch and stand down.
    epoch: AtomicU64,
    shutdown: AtomicBool,
    last_pong: std::sync::Mutex<Instant>,
}

/// Manages the push-channel connection lifecycle.
pub struct ConnectionManager<T: ChatTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: ChatTransport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: ChatTransport> ConnectionManager<T> {
    /// Create a manager and the inbound event stream its reader feeds.
    pub fn new(
        transport: T,
        tokens: Arc<dyn TokenProvider>,
        config: SyncConfig,
    ) -> (Self, mpsc::Receiver<InboundEvent>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            inner: Arc::new(Inner {
                transport,
                tokens,
                config,
                state_tx,
                sink: Mutex::new(None),
                inbound_tx,
                connect_gate: Mutex::new(()),
                epoch: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                last_pong: std::sync::Mutex::new(Instant::now()),
            }),
        };
        (manager, inbound_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Observe state transitions. Dropping the receiver unsubscribes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Establish the connection, authenticating with the current bearer
    /// token. Resolves once the transport reports connected; fails on
    /// timeout (30 s) or transport error. A failed attempt arms the
    /// automatic reconnect cycle. A concurrent call while an attempt is in
    /// flight awaits that attempt instead of dialing a second transport.
    pub async fn connect(&self) -> Result<(), SyncError> {
        self.inner.config.validate()?;
        self.inner.shutdown.store(false, Ordering::Relaxed);

        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                return self.await_settled().await;
            }
            ConnectionState::Disconnected => {}
        }

        let Ok(_gate) = self.inner.connect_gate.try_lock() else {
            // Another task is dialing; share its outcome.
            return self.await_settled().await;
        };
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.set_state(ConnectionState::Reconnecting);
                // The manual attempt counts as the first consecutive failure.
                self.spawn_reconnect_loop(1);
                Err(error)
            }
        }
    }

    /// Tear down the connection and stop automatic reconnection.
    pub async fn disconnect(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.close_sink().await;
        self.set_state(ConnectionState::Disconnected);
        info!("push channel disconnected");
    }

    /// Publish a frame on the push channel. Fails with `NotConnected` when
    /// there is no established connection.
    pub async fn publish(&self, frame: OutboundFrame) -> Result<(), SyncError> {
        if self.state() != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }
        let mut sink = self.inner.sink.lock().await;
        let sink = sink.as_mut().ok_or(SyncError::NotConnected)?;
        sink.publish(frame).await.map_err(SyncError::Transport)
    }

    /// Issue a subscribe call. Only `SubscriptionRegistry` calls this.
    pub async fn subscribe(&self, topic: Topic) -> Result<SubscriptionHandle, SyncError> {
        if self.state() != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }
        let mut sink = self.inner.sink.lock().await;
        let sink = sink.as_mut().ok_or(SyncError::NotConnected)?;
        sink.subscribe(topic).await.map_err(SyncError::Transport)
    }

    /// Issue an unsubscribe call. Only `SubscriptionRegistry` calls this.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SyncError> {
        let mut sink = self.inner.sink.lock().await;
        let sink = sink.as_mut().ok_or(SyncError::NotConnected)?;
        sink.unsubscribe(handle).await.map_err(SyncError::Transport)
    }

    // ── Connection establishment ────────────────────────────────────

    async fn establish(&self) -> Result<(), SyncError> {
        self.set_state(ConnectionState::Connecting);
        let token = self.inner.tokens.bearer_token()?;

        let dial = self.inner.transport.connect(&self.inner.config, &token);
        let connection: TransportConnection =
            match tokio::time::timeout(self.inner.config.connect_timeout(), dial).await {
                Ok(Ok(connection)) => connection,
                Ok(Err(error)) => return Err(SyncError::Transport(error)),
                Err(_) => return Err(SyncError::ConnectTimeout),
            };

        let TransportConnection { sink, events } = connection;
        *self.inner.sink.lock().await = Some(sink);
        self.note_pong();
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Connected);
        self.spawn_reader(events, epoch);
        self.spawn_heartbeat(epoch);
        info!(url = %self.inner.config.ws_url, "push channel connected");
        Ok(())
    }

    /// Wait for an in-flight connect/reconnect cycle to settle.
    async fn await_settled(&self) -> Result<(), SyncError> {
        let mut rx = self.inner.state_tx.subscribe();
        loop {
            match *rx.borrow_and_update() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => {
                    return Err(SyncError::ConnectFailed(
                        "connection attempt failed".to_string(),
                    ));
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(SyncError::ConnectFailed("connection manager dropped".to_string()));
            }
        }
    }

    // ── Background tasks ────────────────────────────────────────────

    fn spawn_reader(&self, mut events: mpsc::Receiver<InboundEvent>, epoch: u64) {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    InboundEvent::Pong => this.note_pong(),
                    other => {
                        if this.inner.inbound_tx.send(other).await.is_err() {
                            // Router gone; the client is being disposed.
                            return;
                        }
                    }
                }
            }
            this.on_connection_lost(epoch).await;
        });
    }

    fn spawn_heartbeat(&self, epoch: u64) {
        let this = self.clone();
        let interval = self.inner.config.heartbeat_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if this.inner.epoch.load(Ordering::SeqCst) != epoch
                    || this.state() != ConnectionState::Connected
                {
                    return;
                }
                if this.last_pong_elapsed() > interval * 2 {
                    warn!("heartbeat timed out, treating as connection loss");
                    this.close_sink().await;
                    this.on_connection_lost(epoch).await;
                    return;
                }
                if let Err(error) = this.ping().await {
                    debug!(%error, "heartbeat ping failed");
                }
            }
        });
    }

    fn spawn_reconnect_loop(&self, start_failures: u32) {
        let this = self.clone();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            let _gate = this.inner.connect_gate.lock().await;
            let policy = this.inner.config.reconnect_policy();
            let mut failures = start_failures;
            while failures < policy.max_attempts {
                // A newer connection or a disconnect supersedes this loop.
                if this.inner.shutdown.load(Ordering::Relaxed)
                    || this.inner.epoch.load(Ordering::SeqCst) != epoch
                {
                    return;
                }
                let delay = policy.delay(failures);
                debug!(attempt = failures + 1, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                tokio::time::sleep(delay).await;
                if this.inner.shutdown.load(Ordering::Relaxed)
                    || this.inner.epoch.load(Ordering::SeqCst) != epoch
                {
                    return;
                }
                match this.establish().await {
                    Ok(()) => {
                        info!("push channel reconnected");
                        return;
                    }
                    Err(error) => {
                        failures += 1;
                        warn!(%error, consecutive_failures = failures, "reconnect attempt failed");
                        this.set_state(ConnectionState::Reconnecting);
                    }
                }
            }
            warn!("reconnect attempts exhausted, settling disconnected");
            this.set_state(ConnectionState::Disconnected);
        });
    }

    async fn on_connection_lost(&self, epoch: u64) {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return;
        }
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        // First notifier wins; the loser observes the state change.
        let initiated = self.inner.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Reconnecting;
                true
            } else {
                false
            }
        });
        if !initiated {
            return;
        }
        warn!("push channel lost, reconnecting");
        self.close_sink().await;
        self.spawn_reconnect_loop(0);
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn ping(&self) -> Result<(), SyncError> {
        let mut sink = self.inner.sink.lock().await;
        let sink = sink.as_mut().ok_or(SyncError::NotConnected)?;
        sink.ping().await.map_err(SyncError::Transport)
    }

    async fn close_sink(&self) {
        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            sink.close().await;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn note_pong(&self) {
        let mut guard =
            self.inner.last_pong.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Instant::now();
    }

    fn last_pong_elapsed(&self) -> std::time::Duration {
        self.inner
            .last_pong
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .elapsed()
    }
}
