//! Synchronization channels.
//!
//! A [`Transport`] moves protocol messages between this client and its peer.
//! [`RelayTransport`] talks to the relay over a websocket; [`LocalTransport`]
//! carries move broadcasts between sessions on the same device. A
//! [`Connector`] opens fresh transports when the driver has to reconnect.

mod local;
mod relay;

pub use local::{LocalHub, LocalTransport};
pub use relay::{RelayConnector, RelayTransport};

use crate::error::ChannelError;
use crate::protocol::{Inbound, Outbound};

/// A bidirectional message channel.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Sends one message.
    async fn send(&mut self, message: &Outbound) -> Result<(), ChannelError>;

    /// Waits for the next message. `None` once the channel is closed for good.
    async fn recv(&mut self) -> Option<Result<Inbound, ChannelError>>;

    /// Whether this channel reaches the relay.
    fn is_networked(&self) -> bool;
}

/// Opens new transports of one kind.
#[async_trait::async_trait]
pub trait Connector: Send {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Opens a fresh connection.
    async fn connect(&mut self) -> Result<Self::Transport, ChannelError>;
}
