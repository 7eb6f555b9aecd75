//! Event loop driving one session over one transport.
//!
//! Local intents, channel messages, the one-second clock and the heartbeat are
//! serialized through a single `select!` loop, so the session never sees two
//! events at once. Outbound messages are flushed before the next event is read.
//! With a [`Connector`] attached, a lost channel is reopened with backoff and
//! the session rejoins through the relay's full-state path.

use crate::error::ChannelError;
use crate::protocol::Outbound;
use crate::session::SyncSession;
use crate::ticker::Ticker;
use crate::transport::{Connector, Transport};
use duel_core::Intent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{error, info, instrument, warn};

/// Capacity of the command queue.
const COMMAND_BUFFER: usize = 32;

/// Longest wait between reconnect attempts, as a multiple of the base backoff.
const MAX_BACKOFF_FACTOR: u32 = 8;

/// Longest a single connect attempt may block the loop.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a [`SyncSession`] against a [`Transport`].
pub struct MatchDriver<T: Transport> {
    session: SyncSession,
    transport: T,
    commands: mpsc::Receiver<Intent>,
    heartbeat: Duration,
    transport_open: bool,
    connector: Option<Box<dyn Connector<Transport = T>>>,
    backoff: Duration,
    retry_delay: Duration,
}

impl<T: Transport> MatchDriver<T> {
    /// Creates a driver and the sender front ends push intents into.
    pub fn new(session: SyncSession, transport: T, heartbeat: Duration) -> (Self, mpsc::Sender<Intent>) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let driver = Self {
            session,
            transport,
            commands,
            heartbeat,
            transport_open: true,
            connector: None,
            backoff: Duration::ZERO,
            retry_delay: Duration::ZERO,
        };
        (driver, tx)
    }

    /// Reopens the channel through `connector` after it is lost.
    ///
    /// The first attempt waits `backoff`; each failure doubles the wait up to
    /// eight times `backoff`.
    pub fn with_reconnect<C>(mut self, connector: C, backoff: Duration) -> Self
    where
        C: Connector<Transport = T> + 'static,
    {
        self.connector = Some(Box::new(connector));
        self.backoff = backoff;
        self.retry_delay = backoff;
        self
    }

    /// Runs until the match is settled or the command sender is dropped.
    ///
    /// Losing the channel does not stop play: the session carries on offline
    /// until a reconnect succeeds.
    #[instrument(skip(self), fields(
        user = %self.session.identity().user_id(),
        role = %self.session.identity().role(),
    ))]
    pub async fn run(mut self) -> anyhow::Result<SyncSession> {
        let networked = self.transport.is_networked();
        let opening = self.session.connect(networked);
        self.flush(opening).await;

        let mut clock = Ticker::every(Duration::from_secs(1));
        let mut heartbeat = Ticker::every(self.heartbeat);
        let mut retry: Option<Ticker> = None;

        loop {
            let outbound = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(intent) => match self.session.handle_command(intent) {
                        Ok(outbound) => outbound,
                        Err(e) => {
                            warn!(error = %e, "Intent refused");
                            Vec::new()
                        }
                    },
                    None => {
                        info!("Command channel closed");
                        break;
                    }
                },
                received = self.transport.recv(), if self.transport_open => match received {
                    Some(Ok(message)) => self.session.handle_inbound(message),
                    Some(Err(e)) if e.is_recoverable() => {
                        warn!(error = %e, "Inbound message dropped");
                        Vec::new()
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Channel failed");
                        self.close_transport();
                        Vec::new()
                    }
                    None => {
                        self.close_transport();
                        Vec::new()
                    }
                },
                Some(_) = clock.tick() => self.session.clock_tick(),
                Some(_) = heartbeat.tick() => self.session.heartbeat().into_iter().collect(),
                Some(_) = next_retry(&mut retry) => {
                    if let Some(mut ticker) = retry.take() {
                        ticker.cancel();
                    }
                    self.reconnect().await
                }
            };
            self.flush(outbound).await;

            if self.is_settled() {
                info!("Match settled");
                break;
            }
            if retry.is_none() {
                retry = self.schedule_retry();
            }
        }

        clock.cancel();
        heartbeat.cancel();
        if let Some(mut ticker) = retry {
            ticker.cancel();
        }
        Ok(self.session)
    }

    /// Over, and nothing more is coming from the relay.
    fn is_settled(&self) -> bool {
        if !self.session.is_over() {
            return false;
        }
        if !self.transport_open || !self.session.is_connected() {
            return true;
        }
        self.session
            .result()
            .is_some_and(|result| !*result.provisional())
    }

    fn close_transport(&mut self) {
        self.transport_open = false;
        self.session.disconnected();
    }

    /// A reconnect ticker, if the channel is down and can be reopened.
    fn schedule_retry(&self) -> Option<Ticker> {
        if self.transport_open || self.connector.is_none() || self.session.is_over() {
            return None;
        }
        info!(delay_ms = self.retry_delay.as_millis() as u64, "Reconnect scheduled");
        Some(Ticker::every(self.retry_delay))
    }

    /// One reconnect attempt. On success the session rejoins and resyncs.
    #[instrument(skip(self), fields(delay_ms = self.retry_delay.as_millis() as u64))]
    async fn reconnect(&mut self) -> Vec<Outbound> {
        let Some(connector) = self.connector.as_mut() else {
            return Vec::new();
        };
        let attempt = match timeout(CONNECT_TIMEOUT, connector.connect()).await {
            Ok(attempt) => attempt,
            Err(_) => Err(ChannelError::Connect("timed out".to_string())),
        };
        match attempt {
            Ok(transport) => {
                info!("Reconnected to relay");
                self.transport = transport;
                self.transport_open = true;
                self.retry_delay = self.backoff;
                self.session.connect(self.transport.is_networked())
            }
            Err(e) => {
                warn!(error = %e, "Reconnect failed");
                self.retry_delay = (self.retry_delay * 2).min(self.backoff * MAX_BACKOFF_FACTOR);
                Vec::new()
            }
        }
    }

    async fn flush(&mut self, outbound: Vec<Outbound>) {
        for message in outbound {
            if !self.transport_open {
                warn!(kind = message.kind(), "Channel closed, message not sent");
                continue;
            }
            match self.transport.send(&message).await {
                Ok(()) => {}
                Err(ChannelError::Malformed(e)) => {
                    warn!(kind = message.kind(), error = %e, "Message not encodable")
                }
                Err(e) => {
                    error!(kind = message.kind(), error = %e, "Send failed");
                    self.close_transport();
                }
            }
        }
    }
}

/// Next reconnect tick, or never when no reconnect is pending.
async fn next_retry(retry: &mut Option<Ticker>) -> Option<Instant> {
    match retry {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}
