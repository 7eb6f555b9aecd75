//! Duel client - relay synchronization for capture duel matches
//!
//! Wraps [`duel_core::MatchState`] in a [`SyncSession`] that speaks the
//! relay protocol, and runs it with a [`MatchDriver`] over either the relay
//! websocket or the same-device channel.
//!
//! # Architecture
//!
//! - **Protocol**: typed [`Inbound`]/[`Outbound`] messages and the snapshot wire form
//! - **Transport**: [`RelayTransport`] (websocket) and [`LocalTransport`] (same device),
//!   reopened through a [`Connector`]
//! - **Session**: [`SyncSession`], reconciliation, settlement and presence
//! - **Driver**: [`MatchDriver`], the event loop with clock, heartbeat and reconnect ticks
//! - **Bus**: [`EventBus`], typed events for front ends
//!
//! # Example
//!
//! ```no_run
//! use duel_client::{ClientConfig, EventBus, Identity, LocalHub, MatchDriver, SyncSession};
//! use duel_core::{GridOracle, MatchState};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::default();
//! let table = config.rule_table()?;
//! let board = table.initial_board();
//! let state = MatchState::new(
//!     Arc::new(GridOracle::new(table)),
//!     *config.role(),
//!     board,
//!     config.clocks(),
//! );
//! let identity = Identity::new(
//!     config.resolved_user_id(),
//!     config.match_id().clone(),
//!     *config.role(),
//!     true,
//! );
//! let session = SyncSession::new(identity, state, config.disconnect_timer(), EventBus::default());
//! let (driver, commands) = MatchDriver::new(session, LocalHub::default().attach(), config.heartbeat_period());
//! drop(commands);
//! driver.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bus;
mod config;
mod driver;
mod error;
mod protocol;
mod session;
mod ticker;
mod transport;
mod view;

// Crate-level exports - Configuration
pub use config::{ClientConfig, ConfigError, RELAY_URL_VAR, USER_ID_VAR};

// Crate-level exports - Errors
pub use error::ChannelError;

// Crate-level exports - Protocol
pub use protocol::{
    decode_snapshot, parse_outcome, CapturesPayload, Encoded, FinishPayload, GameEndedPayload,
    Inbound, LocalFrame, MoveLogPayload, Outbound, PendingPayload, PlayerInfo, PresencePayload,
    RatingPayload, SnapshotPayload,
};

// Crate-level exports - Channels
pub use transport::{
    Connector, LocalHub, LocalTransport, RelayConnector, RelayTransport, Transport,
};

// Crate-level exports - Session and driver
pub use driver::MatchDriver;
pub use session::{Identity, SyncSession};
pub use ticker::Ticker;

// Crate-level exports - Front-end surface
pub use bus::{AppEvent, EventBus, Subscription};
pub use view::{MatchView, PieceView};
