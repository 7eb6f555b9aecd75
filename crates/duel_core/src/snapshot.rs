//! Complete match snapshots exchanged between peers.
//!
//! Every broadcast carries the whole post-action state rather than a diff, so
//! a client that missed messages catches up with the next one it receives.

use super::history::{CaptureLedger, MoveLog};
use super::result::ResultReason;
use super::{Board, ClockPair, MoveCounts, MovedFlags, Outcome, PendingChain, Role, TurnPhase};
use serde::{Deserialize, Serialize};

/// How a match finished, as carried inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finish {
    /// Winner or draw.
    pub outcome: Outcome,
    /// Reason code.
    pub reason: ResultReason,
}

/// Strongly-typed match state as it travels between clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    /// Piece positions.
    pub board: Board,
    /// Role holding the turn.
    pub current_turn: Role,
    /// Phase of the turn owner.
    pub phase: TurnPhase,
    /// Every action so far.
    pub move_log: MoveLog,
    /// Captured pieces per captor.
    pub captures: CaptureLedger,
    /// Pieces that have made their first move.
    pub moved: MovedFlags,
    /// Lifetime action count per piece.
    pub counts: MoveCounts,
    /// Remaining clock time.
    pub clocks: ClockPair,
    /// Open capture chain of the turn owner.
    pub pending: Option<PendingChain>,
    /// Sender's action counter.
    pub version: u64,
    /// Set once the sender considers the match over.
    pub finish: Option<Finish>,
}

/// Where an inbound snapshot came from. Decides how clocks are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotSource {
    /// The opponent's move broadcast.
    PeerMove,
    /// The relay's authoritative state, e.g. on reconnect.
    Server,
}

/// What applying a snapshot did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The match is already over; nothing changed.
    Ignored,
    /// State replaced. `diverged` is set when the sender was not ahead of us.
    Applied {
        /// Whether the snapshot's version failed to advance past ours.
        diverged: bool,
    },
    /// State replaced and the snapshot declared the match finished.
    Finished(Finish),
}

/// Error converting a wire payload into a [`MatchSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SnapshotError {
    /// The payload is not valid JSON or misses required fields.
    #[display("Malformed snapshot: {}", _0)]
    Malformed(String),

    /// A coordinate could not be parsed.
    #[display("Bad coordinate: {}", _0)]
    Coordinate(String),

    /// An unknown role name.
    #[display("Unknown role '{}'", _0)]
    Role(String),

    /// An unknown phase name.
    #[display("Unknown phase '{}'", _0)]
    Phase(String),

    /// The move log skips or repeats a sequence number.
    #[display("Move log breaks at seq {}", _0)]
    LogGap(u32),
}

impl std::error::Error for SnapshotError {}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Malformed(err.to_string())
    }
}
