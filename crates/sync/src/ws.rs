// tokio-tungstenite implementation of the push transport.
//
// Speaks `WsFrame` as JSON text messages. The bearer token and protocol
// version go out as HTTP headers on the upgrade request; the read half is
// pumped into the connection's event channel and decoded per topic.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WireMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use uuid::Uuid;

use banter_common::protocol::topic::PublishDestination;
use banter_common::protocol::ws::{MessageOp, PresencePayload, TypingPayload, PROTOCOL_VERSION};
use banter_common::protocol::{Topic, WsFrame};
use banter_common::types::{MessageEvent, ServerError, TypingIndicator, UserPresence};

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::transport::{
    ChatTransport, InboundEvent, OutboundFrame, SubscriptionHandle, TransportConnection,
    TransportSink,
};

const PROTOCOL_HEADER: &str = "x-banter-protocol";
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production push transport over WebSocket.
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatTransport for WsTransport {
    async fn connect(
        &self,
        config: &SyncConfig,
        token: &str,
    ) -> Result<TransportConnection, TransportError> {
        let mut request = config
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|error| TransportError::ConnectFailed(error.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|error| TransportError::ConnectFailed(error.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);
        request
            .headers_mut()
            .insert(PROTOCOL_HEADER, HeaderValue::from_static(PROTOCOL_VERSION));

        let (stream, _response) = connect_async(request).await.map_err(map_connect_error)?;
        let (write, read) = stream.split();

        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(read_pump(read, event_tx));

        Ok(TransportConnection { sink: Box::new(WsSink { write }), events })
    }
}

fn map_connect_error(error: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error;
    match &error {
        Error::Http(response) if response.status().as_u16() == 401 || response.status().as_u16() == 403 => {
            TransportError::AuthRejected(response.status().to_string())
        }
        _ => TransportError::ConnectFailed(error.to_string()),
    }
}

async fn read_pump(mut read: SplitStream<WsStream>, events: mpsc::Sender<InboundEvent>) {
    while let Some(frame) = read.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(error) => {
                debug!(%error, "websocket read failed");
                break;
            }
        };
        match message {
            WireMessage::Text(text) => {
                let frame: WsFrame = match serde_json::from_str(text.as_str()) {
                    Ok(frame) => frame,
                    Err(error) => {
                        debug!(%error, "undecodable frame dropped");
                        continue;
                    }
                };
                if let Some(event) = decode_frame(frame) {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
            WireMessage::Close(_) => break,
            // Transport-level ping/pong is handled by tungstenite itself.
            _ => {}
        }
    }
    // Dropping the sender ends the event stream; the connection manager
    // treats that as closure.
}

/// Decode a server frame into a typed inbound event. Client-to-server frame
/// kinds and unparseable destinations are dropped.
fn decode_frame(frame: WsFrame) -> Option<InboundEvent> {
    match frame {
        WsFrame::Pong => Some(InboundEvent::Pong),
        WsFrame::Error { code, message, group_id } => {
            Some(InboundEvent::ServerError(ServerError { code, message, group_id }))
        }
        WsFrame::Event { destination, payload, .. } => match Topic::parse(&destination)? {
            Topic::GroupMessages(_) => serde_json::from_value::<MessageEvent>(payload)
                .ok()
                .map(InboundEvent::Message),
            Topic::GroupTyping(_) => serde_json::from_value::<TypingIndicator>(payload)
                .ok()
                .map(InboundEvent::Typing),
            Topic::Presence => serde_json::from_value::<UserPresence>(payload)
                .ok()
                .map(InboundEvent::Presence),
            Topic::Errors => serde_json::from_value::<ServerError>(payload)
                .ok()
                .map(InboundEvent::ServerError),
        },
        _ => None,
    }
}

struct WsSink {
    write: SplitSink<WsStream, WireMessage>,
}

impl WsSink {
    async fn send_frame(&mut self, frame: &WsFrame) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame)?;
        self.write
            .send(WireMessage::text(text))
            .await
            .map_err(|error| TransportError::WebSocket(error.to_string()))
    }
}

#[async_trait]
impl TransportSink for WsSink {
    async fn subscribe(&mut self, topic: Topic) -> Result<SubscriptionHandle, TransportError> {
        let id = Uuid::new_v4();
        self.send_frame(&WsFrame::Subscribe { id, destination: topic.destination() }).await?;
        Ok(SubscriptionHandle::new(id))
    }

    async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        self.send_frame(&WsFrame::Unsubscribe { id: handle.id() }).await
    }

    async fn publish(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let (destination, payload) = encode_outbound(frame)?;
        self.send_frame(&WsFrame::Publish { destination: destination.destination(), payload })
            .await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.send_frame(&WsFrame::Ping).await
    }

    async fn close(&mut self) {
        let _ = self.write.close().await;
    }
}

fn encode_outbound(
    frame: OutboundFrame,
) -> Result<(PublishDestination, serde_json::Value), TransportError> {
    let encoded = match frame {
        OutboundFrame::SendMessage { group_id, client_temp_id, content, parent_message_id } => (
            PublishDestination::GroupSend(group_id),
            serde_json::to_value(MessageOp::Send { client_temp_id, content, parent_message_id })?,
        ),
        OutboundFrame::EditMessage { group_id, id, content } => (
            PublishDestination::GroupSend(group_id),
            serde_json::to_value(MessageOp::Edit { id, content })?,
        ),
        OutboundFrame::DeleteMessage { group_id, id } => (
            PublishDestination::GroupSend(group_id),
            serde_json::to_value(MessageOp::Delete { id })?,
        ),
        OutboundFrame::Typing { group_id, typing } => (
            PublishDestination::GroupTyping(group_id),
            serde_json::to_value(TypingPayload { typing })?,
        ),
        OutboundFrame::Presence { status } => (
            PublishDestination::Presence,
            serde_json::to_value(PresencePayload { status })?,
        ),
    };
    Ok(encoded)
}
