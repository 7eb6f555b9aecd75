//! Rule oracle boundary.
//!
//! The state machine never computes legality itself. Everything it needs
//! to know about where a piece may go comes from a [`RuleOracle`], a pure,
//! deterministic service. [`GridOracle`] is the table-driven implementation
//! shipped with the crate.

mod grid;

pub use grid::{GridOracle, PieceRule, RuleTable, RuleTableError, Step};

use super::{Board, Coord, MoveCounts, PieceId, Role};
use serde::{Deserialize, Serialize};

/// Non-capturing destinations for a piece.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalMoves {
    /// Ordinary moves.
    pub simple: Vec<Coord>,
    /// Extended moves unlocked once the piece has made its first move.
    pub advance: Vec<Coord>,
}

impl LegalMoves {
    /// Checks whether a coordinate is any kind of legal move.
    pub fn contains(&self, coord: &Coord) -> bool {
        self.simple.contains(coord) || self.advance.contains(coord)
    }

    /// Checks whether there is nowhere to go.
    pub fn is_empty(&self) -> bool {
        self.simple.is_empty() && self.advance.is_empty()
    }
}

/// Continuation options after a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Forced non-capturing relocations.
    pub moves: Vec<Coord>,
    /// Further captures.
    pub attacks: Vec<Coord>,
}

/// When an attack query is made relative to the piece's move this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttackStage {
    /// Before the piece has moved this turn.
    PreMove,
    /// Right after a non-capturing move.
    PostMove,
}

/// Which of the two instant-win conditions an attack met.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WinCondition {
    /// The captured piece was the opponent's commander.
    CommanderCaptured,
    /// The captured piece was the opponent's last piece.
    NoPiecesLeft,
}

/// Result of a legal attack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackOutcome {
    /// Board after the capture and the attacker's relocation.
    pub board: Board,
    /// The piece that was taken.
    pub captured: PieceId,
    /// Set when the capture ends the match.
    pub winner: Option<(Role, WinCondition)>,
}

/// Pure legality service consumed by the turn state machine.
///
/// Implementations hold their own move and attack rule tables.
pub trait RuleOracle: Send + Sync {
    /// Legal simple and advance moves for a piece.
    fn legal_moves(
        &self,
        piece: &PieceId,
        at: &Coord,
        first_move: bool,
        board: &Board,
        counts: &MoveCounts,
    ) -> LegalMoves;

    /// Legal capture targets for a piece.
    fn legal_attacks(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        stage: AttackStage,
        initial: bool,
    ) -> Vec<Coord>;

    /// Forced non-capturing relocations owed after a capture.
    fn mandatory_continuations(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        counts: &MoveCounts,
    ) -> Vec<Coord>;

    /// Further captures and forced relocations available from `at`.
    fn multi_capture_options(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        mandatory_used: bool,
        counts: &MoveCounts,
    ) -> CaptureOptions;

    /// Resolves an attack. Returns `None` when the attack is illegal.
    fn execute_attack(
        &self,
        target: &Coord,
        board: &Board,
        attacker: &PieceId,
    ) -> Option<AttackOutcome>;

    /// Which role owns a piece.
    fn piece_owner(&self, piece: &PieceId) -> Option<Role>;

    /// Human-readable piece name for move log entries.
    fn display_name(&self, piece: &PieceId) -> String {
        piece.to_string()
    }
}
