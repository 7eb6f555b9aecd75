//! Same-device channel for guest play.
//!
//! Only move broadcasts travel here; there is no relay to join, heartbeat or
//! settle with. Every subscriber sees every frame, including its own, so the
//! session filters self-echoes by actor id.

use super::Transport;
use crate::error::ChannelError;
use crate::protocol::{Inbound, LocalFrame, Outbound};
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

/// Shared broadcast channel that local transports attach to.
#[derive(Debug, Clone)]
pub struct LocalHub {
    tx: broadcast::Sender<String>,
}

impl LocalHub {
    /// Creates a hub buffering up to `capacity` frames per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attaches a new transport.
    pub fn attach(&self) -> LocalTransport {
        LocalTransport {
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }

    /// Publishes a raw frame, as another tab on the device would.
    pub fn publish_raw(&self, frame: impl Into<String>) -> usize {
        self.tx.send(frame.into()).unwrap_or(0)
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// One endpoint on a [`LocalHub`].
#[derive(Debug)]
pub struct LocalTransport {
    tx: broadcast::Sender<String>,
    rx: broadcast::Receiver<String>,
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    #[instrument(skip(self, message), fields(kind = message.kind()))]
    async fn send(&mut self, message: &Outbound) -> Result<(), ChannelError> {
        let Outbound::MoveMade {
            snapshot, actor_id, ..
        } = message
        else {
            debug!("No relay on the local channel, message dropped");
            return Ok(());
        };
        let frame = LocalFrame {
            snapshot: crate::protocol::Encoded::inline(snapshot)?,
            actor_id: actor_id.clone(),
        };
        let text = serde_json::to_string(&frame)?;
        // Nobody listening is not an error; the peer may not have opened yet.
        let receivers = self.tx.send(text).unwrap_or(0);
        debug!(receivers, "Local frame published");
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Inbound, ChannelError>> {
        loop {
            match self.rx.recv().await {
                Ok(text) => {
                    let frame = serde_json::from_str::<LocalFrame>(&text)
                        .map(|frame| Inbound::MoveMade {
                            match_id: None,
                            snapshot: frame.snapshot,
                            actor_id: Some(frame.actor_id),
                        })
                        .map_err(ChannelError::from);
                    return Some(frame);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Local channel lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn is_networked(&self) -> bool {
        false
    }
}
