//! Turn phases and the transient state attached to them.

use super::rules::{CaptureOptions, LegalMoves};
use super::{Coord, PieceId, Role};
use serde::{Deserialize, Serialize};

/// Phase of the turn as seen by one client.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnPhase {
    /// No piece chosen; any own piece may be picked.
    Select,
    /// A piece is chosen and its legal destinations are known.
    Action,
    /// A forced continuation must be taken before control passes.
    MandatoryMove,
    /// Not this client's turn, or waiting for the network.
    Locked,
}

impl TurnPhase {
    /// Whether a piece may be picked in this phase.
    pub fn accepts_selection(&self) -> bool {
        matches!(self, TurnPhase::Select | TurnPhase::Action)
    }

    /// Whether a destination may be committed in this phase.
    pub fn accepts_commit(&self) -> bool {
        matches!(self, TurnPhase::Action | TurnPhase::MandatoryMove)
    }
}

/// The piece picked during `action`, with everything the oracle allowed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Selected piece.
    pub piece: PieceId,
    /// Where it stands.
    pub from: Coord,
    /// Legal non-capturing destinations.
    pub moves: LegalMoves,
    /// Legal capture targets.
    pub attacks: Vec<Coord>,
}

impl Selection {
    /// Checks whether a coordinate is a capture target.
    pub fn can_attack(&self, target: &Coord) -> bool {
        self.attacks.contains(target)
    }

    /// Checks whether a coordinate is a legal non-capturing destination.
    pub fn can_move(&self, target: &Coord) -> bool {
        self.moves.contains(target)
    }
}

/// An open capture chain: the piece that must keep acting and its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChain {
    /// Piece that owes the continuation.
    pub piece: PieceId,
    /// Its current coordinate.
    pub at: Coord,
    /// Forced relocation targets.
    #[serde(default)]
    pub moves: Vec<Coord>,
    /// Continuation capture targets.
    #[serde(default)]
    pub attacks: Vec<Coord>,
    /// Whether the forced relocation has already been spent this turn.
    #[serde(default)]
    pub mandatory_used: bool,
}

impl PendingChain {
    /// Builds a chain from oracle options.
    pub fn new(piece: PieceId, at: Coord, options: CaptureOptions, mandatory_used: bool) -> Self {
        Self {
            piece,
            at,
            moves: options.moves,
            attacks: options.attacks,
            mandatory_used,
        }
    }

    /// A chain with nothing left to do ends the turn.
    pub fn is_exhausted(&self) -> bool {
        self.moves.is_empty() && self.attacks.is_empty()
    }
}

/// Outcome of a finished match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The given role won.
    Winner(Role),
    /// Nobody won.
    Draw,
}

impl Outcome {
    /// Returns the winner if there is one.
    pub fn winner(&self) -> Option<Role> {
        match self {
            Outcome::Winner(role) => Some(*role),
            Outcome::Draw => None,
        }
    }

    /// Returns true if the match was drawn.
    pub fn is_draw(&self) -> bool {
        matches!(self, Outcome::Draw)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Winner(role) => write!(f, "{} wins", role),
            Outcome::Draw => write!(f, "Draw"),
        }
    }
}
