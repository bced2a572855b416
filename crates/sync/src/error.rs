// Error taxonomy for the sync core.
//
// Connection errors never surface to event consumers directly; they become
// state transitions. Send errors are returned to the caller. Typing and
// presence publish failures are logged and dropped.

/// Transport-level failures on the push channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectFailed(String),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("connection closed")]
    Closed,

    #[error("publish confirmation timed out")]
    ConfirmTimeout,

    #[error("frame encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Failures of the sync core's own lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("connect timed out")]
    ConnectTimeout,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("no credential available: {0}")]
    Token(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("client already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures of the HTTP fallback surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no credential available: {0}")]
    Auth(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response decode failed: {0}")]
    Decode(String),
}

/// Failure of a message send/edit/delete after both write paths were tried.
/// `push` carries the push-channel failure when that path was attempted;
/// `fallback` is the HTTP error that exhausted delivery.
#[derive(Debug, thiserror::Error)]
#[error("delivery failed: {fallback}")]
pub struct SendError {
    pub push: Option<TransportError>,
    #[source]
    pub fallback: ApiError,
}
