//! Peer connection status and the forfeiture countdown shown while a peer is away.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What this client knows about the peer's connection. Rebuilt from relay signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Whether the peer is currently connected.
    pub connected: bool,
    /// When the peer was last seen disconnecting.
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            connected: true,
            disconnected_at: None,
        }
    }
}

impl ConnectionStatus {
    /// Records a disconnect. An earlier timestamp already on file is kept.
    pub fn mark_disconnected(&mut self, at: DateTime<Utc>) {
        self.connected = false;
        if self.disconnected_at.is_none() {
            self.disconnected_at = Some(at);
        }
    }

    /// Records a (re)connect.
    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.disconnected_at = None;
    }
}

/// Countdown to forfeiture for a disconnected peer.
///
/// Display only: the relay decides when the forfeit actually happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectTimer {
    grace: Duration,
}

impl DisconnectTimer {
    /// Creates a timer with the given grace window.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// The grace window.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Seconds left before the relay forfeits the peer, or `None` while connected.
    pub fn remaining(&self, status: &ConnectionStatus, now: DateTime<Utc>) -> Option<i64> {
        if status.connected {
            return None;
        }
        let since = status.disconnected_at?;
        let left = (since + self.grace - now).num_seconds();
        Some(left.max(0))
    }
}
