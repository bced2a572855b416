// Outgoing writes: push channel first, HTTP fallback second.
//
// A message send is optimistic: the reconciler shows a temp entry
// immediately, the push publish carries the temp id, and the server echoes
// it back on the messages topic. If the push path is unavailable, fails, or
// the echo never arrives within the confirm window, the same write goes out
// over REST. At most one authoritative copy ever becomes visible; the
// reconciler's id dedup guarantees that, not this coordinator.
//
// Typing and presence updates are best-effort: no fallback, failures are
// logged at debug and swallowed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::debug;

use banter_common::types::{GroupId, Message, MessageEvent, MessageId, PresenceStatus};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{SendError, SyncError, TransportError};
use crate::reconcile::MessageReconciler;
use crate::rest::{CreateMessageRequest, MessageApi};
use crate::transport::{ChatTransport, OutboundFrame};

/// A message send in flight: optimistic entry placed, confirmation pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub client_temp_id: i64,
    pub group_id: GroupId,
    pub content: String,
    pub parent_message_id: Option<MessageId>,
    pub attempt: u32,
    /// How long the push path waits for its echo before falling back.
    pub deadline: Duration,
}

/// Sends messages, typing, and presence over the push channel with HTTP
/// fallback, and feeds confirmations back into the reconciler.
pub struct DeliveryCoordinator<T: ChatTransport, A: MessageApi> {
    conn: ConnectionManager<T>,
    api: Arc<A>,
    reconciler: Arc<StdMutex<MessageReconciler>>,
    confirm_timeout: Duration,
    next_temp_id: AtomicI64,
    /// Oneshot waiters keyed by temp id, resolved by the push echo.
    waiters: StdMutex<HashMap<i64, oneshot::Sender<Message>>>,
}

impl<T: ChatTransport, A: MessageApi> DeliveryCoordinator<T, A> {
    pub fn new(
        conn: ConnectionManager<T>,
        api: Arc<A>,
        reconciler: Arc<StdMutex<MessageReconciler>>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            api,
            reconciler,
            confirm_timeout,
            next_temp_id: AtomicI64::new(-1),
            waiters: StdMutex::new(HashMap::new()),
        }
    }

    /// Send a message. Resolves with the server-assigned message from
    /// whichever path confirmed first; rejects only after both paths
    /// failed, leaving the optimistic entry marked failed.
    pub async fn send_message(
        &self,
        group_id: GroupId,
        content: impl Into<String>,
        parent_message_id: Option<MessageId>,
    ) -> Result<Message, SendError> {
        let content = content.into();
        let temp_id = self.next_temp_id.fetch_sub(1, Ordering::Relaxed);
        let pending = PendingSend {
            client_temp_id: temp_id,
            group_id,
            content: content.clone(),
            parent_message_id,
            attempt: 0,
            deadline: self.confirm_timeout,
        };
        self.reconciler_lock().insert_optimistic(&pending, Utc::now());

        let mut push_error: Option<TransportError> = None;
        if self.conn.state() == ConnectionState::Connected {
            match self.push_and_await_echo(&pending).await {
                Ok(message) => return Ok(message),
                Err(error) => push_error = Some(error),
            }
        }

        // Fallback: the REST create. `client_temp_id` is the idempotency
        // key, so a push publish that actually landed yields the same id.
        let request = CreateMessageRequest {
            content,
            parent_message_id,
            client_temp_id: temp_id,
        };
        match self.api.create_message(group_id, &request).await {
            Ok(message) => {
                self.reconciler_lock().confirm_optimistic(temp_id, message.clone());
                Ok(message)
            }
            Err(fallback) => {
                self.reconciler_lock().fail_optimistic(group_id, temp_id);
                Err(SendError { push: push_error, fallback })
            }
        }
    }

    /// Edit a message: push when connected, REST otherwise or on failure.
    /// The edited content lands via the topic echo or the REST response.
    pub async fn edit_message(
        &self,
        group_id: GroupId,
        id: MessageId,
        content: impl Into<String>,
    ) -> Result<(), SendError> {
        let content = content.into();
        let mut push_error = None;
        if self.conn.state() == ConnectionState::Connected {
            let frame =
                OutboundFrame::EditMessage { group_id, id, content: content.clone() };
            match self.conn.publish(frame).await {
                Ok(()) => return Ok(()),
                Err(error) => push_error = Some(into_transport_error(error)),
            }
        }
        match self.api.edit_message(group_id, id, &content).await {
            Ok(message) => {
                self.reconciler_lock().ingest(MessageEvent::Edited { message });
                Ok(())
            }
            Err(fallback) => Err(SendError { push: push_error, fallback }),
        }
    }

    /// Delete a message, same primary/fallback pattern as edits.
    pub async fn delete_message(
        &self,
        group_id: GroupId,
        id: MessageId,
    ) -> Result<(), SendError> {
        let mut push_error = None;
        if self.conn.state() == ConnectionState::Connected {
            match self.conn.publish(OutboundFrame::DeleteMessage { group_id, id }).await {
                Ok(()) => return Ok(()),
                Err(error) => push_error = Some(into_transport_error(error)),
            }
        }
        match self.api.delete_message(group_id, id).await {
            Ok(()) => {
                self.reconciler_lock().ingest(MessageEvent::Deleted { group_id, id });
                Ok(())
            }
            Err(fallback) => Err(SendError { push: push_error, fallback }),
        }
    }

    /// Best-effort typing update: push only, failures swallowed.
    pub async fn set_typing(&self, group_id: GroupId, typing: bool) {
        if self.conn.state() != ConnectionState::Connected {
            return;
        }
        if let Err(error) = self.conn.publish(OutboundFrame::Typing { group_id, typing }).await {
            debug!(%error, group_id, "typing update dropped");
        }
    }

    /// Best-effort presence update: push only, failures swallowed.
    pub async fn set_presence(&self, status: PresenceStatus) {
        if self.conn.state() != ConnectionState::Connected {
            return;
        }
        if let Err(error) = self.conn.publish(OutboundFrame::Presence { status }).await {
            debug!(%error, "presence update dropped");
        }
    }

    /// Route an inbound message event: resolve any echo waiter first, then
    /// hand the event to the reconciler. Called by the client router.
    pub fn handle_inbound(&self, event: MessageEvent) {
        if let MessageEvent::New { message } = &event {
            if let Some(temp_id) = message.client_temp_id {
                let waiter = self.waiters_lock().remove(&temp_id);
                if let Some(waiter) = waiter {
                    let _ = waiter.send(message.clone());
                }
            }
        }
        self.reconciler_lock().ingest(event);
    }

    async fn push_and_await_echo(&self, pending: &PendingSend) -> Result<Message, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.waiters_lock().insert(pending.client_temp_id, tx);

        let frame = OutboundFrame::SendMessage {
            group_id: pending.group_id,
            client_temp_id: pending.client_temp_id,
            content: pending.content.clone(),
            parent_message_id: pending.parent_message_id,
        };
        if let Err(error) = self.conn.publish(frame).await {
            self.waiters_lock().remove(&pending.client_temp_id);
            return Err(into_transport_error(error));
        }

        match tokio::time::timeout(pending.deadline, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => {
                self.waiters_lock().remove(&pending.client_temp_id);
                Err(TransportError::Closed)
            }
            Err(_) => {
                self.waiters_lock().remove(&pending.client_temp_id);
                Err(TransportError::ConfirmTimeout)
            }
        }
    }

    fn reconciler_lock(&self) -> std::sync::MutexGuard<'_, MessageReconciler> {
        self.reconciler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn waiters_lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, oneshot::Sender<Message>>> {
        self.waiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn into_transport_error(error: SyncError) -> TransportError {
    match error {
        SyncError::Transport(error) => error,
        _ => TransportError::Closed,
    }
}
