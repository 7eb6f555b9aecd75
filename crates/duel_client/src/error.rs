//! Synchronization channel errors.

use derive_more::Display;

/// Failure on the relay connection or the same-device channel.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ChannelError {
    /// The relay address is not a usable websocket URL.
    #[display("Invalid relay url: {}", _0)]
    Url(String),

    /// Connecting to the relay failed.
    #[display("Connect failed: {}", _0)]
    Connect(String),

    /// Writing a frame failed.
    #[display("Send failed: {}", _0)]
    Send(String),

    /// Reading a frame failed.
    #[display("Receive failed: {}", _0)]
    Receive(String),

    /// A frame arrived that is not a known message.
    #[display("Malformed payload: {}", _0)]
    Malformed(String),

    /// The other end is gone.
    #[display("Channel closed")]
    Closed,
}

impl std::error::Error for ChannelError {}

impl ChannelError {
    /// Whether the channel can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChannelError::Malformed(_))
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Malformed(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => ChannelError::Closed,
            other => ChannelError::Receive(other.to_string()),
        }
    }
}

impl From<url::ParseError> for ChannelError {
    fn from(err: url::ParseError) -> Self {
        ChannelError::Url(err.to_string())
    }
}
