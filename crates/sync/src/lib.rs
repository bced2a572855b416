// banter-sync: the real-time group messaging synchronization core.
//
// One duplex push connection multiplexes per-group message/typing/presence
// channels; outgoing writes fall back to REST when the push channel is
// unavailable; both transports converge into a single ordered,
// de-duplicated message stream per group.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod presence;
pub mod reconcile;
pub mod rest;
pub mod subscriptions;
pub mod token;
pub mod transport;
pub mod typing;
pub mod ws;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{ChatClient, ChatEvent};
pub use config::SyncConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use delivery::{DeliveryCoordinator, PendingSend};
pub use error::{ApiError, SendError, SyncError, TransportError};
pub use reconcile::{DeliveryState, MessageEntry, MessageReconciler};
pub use rest::{CreateMessageRequest, HttpMessageApi, MessageApi};
pub use presence::PresenceTracker;
pub use subscriptions::SubscriptionRegistry;
pub use token::{StaticTokenProvider, TokenProvider};
pub use transport::{ChatTransport, InboundEvent, OutboundFrame, SubscriptionHandle};
pub use typing::{TypingAggregator, TYPING_TTL};
pub use ws::WsTransport;
