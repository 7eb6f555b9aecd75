//! Player intents and the ways the state machine refuses them.
//!
//! Intents are first-class values so the driver can log, queue and route them
//! without touching match state.

use super::rules::WinCondition;
use super::{Coord, Role, TurnPhase};
use serde::{Deserialize, Serialize};

/// Something the local player wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Pick the own piece standing on a square.
    Select {
        /// Square of the piece.
        at: Coord,
    },
    /// Move or capture onto a square with the active piece.
    Commit {
        /// Destination or capture target.
        to: Coord,
    },
    /// Drop the current selection.
    Cancel,
    /// Give up the match.
    Resign,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Select { at } => write!(f, "select {}", at),
            Intent::Commit { to } => write!(f, "commit {}", to),
            Intent::Cancel => write!(f, "cancel"),
            Intent::Resign => write!(f, "resign"),
        }
    }
}

/// What a committed action did to the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The same player must keep acting (a capture chain is open).
    Continued,
    /// Control passed to the opponent.
    TurnPassed,
    /// The action ended the match.
    Won {
        /// Winning role.
        winner: Role,
        /// Which win condition was met.
        condition: WinCondition,
    },
}

/// Error returned when an intent is refused. A refused intent never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The match already has a result.
    #[display("Match is over")]
    MatchOver,

    /// The opponent holds the turn.
    #[display("It's {}'s turn", _0)]
    NotYourTurn(Role),

    /// The current phase does not accept this intent.
    #[display("Not allowed during {} phase", _0)]
    WrongPhase(TurnPhase),

    /// Nothing stands on the square.
    #[display("No piece on {}", _0)]
    NoPiece(Coord),

    /// The piece on the square belongs to the opponent.
    #[display("Piece on {} is not yours", _0)]
    NotYourPiece(Coord),

    /// The oracle does not allow the destination.
    #[display("Illegal target {}", _0)]
    IllegalTarget(Coord),

    /// A postcondition check failed.
    #[display("Invariant violation: {}", _0)]
    InvariantViolation(String),
}

impl std::error::Error for MoveError {}
