//! Websocket connection to the relay.

use super::{Connector, Transport};
use crate::error::ChannelError;
use crate::protocol::{Inbound, Outbound};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};
use url::Url;

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// A live relay connection.
pub struct RelayTransport {
    url: Url,
    write: WsWrite,
    read: WsRead,
    closed: bool,
}

impl std::fmt::Debug for RelayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayTransport")
            .field("url", &self.url.as_str())
            .field("closed", &self.closed)
            .finish()
    }
}

impl RelayTransport {
    /// Opens the websocket.
    #[instrument(skip(url), fields(url = %url))]
    pub async fn connect(url: Url) -> Result<Self, ChannelError> {
        info!("Connecting to relay");
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "Relay handshake complete");
        let (write, read) = stream.split();
        Ok(Self {
            url,
            write,
            read,
            closed: false,
        })
    }

    /// The relay address.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl Transport for RelayTransport {
    #[instrument(skip(self, message), fields(kind = message.kind()))]
    async fn send(&mut self, message: &Outbound) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let text = serde_json::to_string(message)?;
        if let Err(e) = self.write.send(Message::Text(text.into())).await {
            warn!(error = %e, "Relay write failed");
            self.closed = true;
            return Err(ChannelError::Send(e.to_string()));
        }
        debug!("Message sent");
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Inbound, ChannelError>> {
        if self.closed {
            return None;
        }
        while let Some(frame) = self.read.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    self.closed = true;
                    return Some(Err(ChannelError::from(e)));
                }
            };
            match frame {
                Message::Text(text) => {
                    if text.as_str().trim().is_empty() {
                        continue;
                    }
                    return Some(Inbound::parse(text.as_str()).map_err(ChannelError::from));
                }
                Message::Close(reason) => {
                    info!(?reason, "Relay closed the connection");
                    self.closed = true;
                    return None;
                }
                // Pings are answered by the websocket layer.
                _ => continue,
            }
        }
        self.closed = true;
        None
    }

    fn is_networked(&self) -> bool {
        true
    }
}

/// Reopens relay connections to one address.
#[derive(Debug, Clone)]
pub struct RelayConnector {
    url: Url,
}

impl RelayConnector {
    /// Connector for the relay at `url`.
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait::async_trait]
impl Connector for RelayConnector {
    type Transport = RelayTransport;

    async fn connect(&mut self) -> Result<RelayTransport, ChannelError> {
        RelayTransport::connect(self.url.clone()).await
    }
}
