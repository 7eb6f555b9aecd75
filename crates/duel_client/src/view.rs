//! Display-ready view of a session.

use duel_core::{
    format_clock, CaptureLedger, ClockPair, Coord, MatchResult, MoveLogEntry, PendingChain, PieceId,
    Role, TurnPhase,
};
use std::fmt::Write;

/// A piece as the view shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceView {
    /// Piece id.
    pub id: PieceId,
    /// Where it stands.
    pub at: Coord,
    /// Owner, if the oracle knows it.
    pub owner: Option<Role>,
    /// Display name.
    pub name: String,
}

impl PieceView {
    /// One-letter glyph: upper case for player1, lower case for player2.
    pub fn glyph(&self) -> char {
        let letter = self.name.chars().next().unwrap_or('?');
        match self.owner {
            Some(Role::Player2) => letter.to_ascii_lowercase(),
            _ => letter.to_ascii_uppercase(),
        }
    }
}

/// Everything a front end needs to draw the match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchView {
    /// This client's seat.
    pub local_role: Role,
    /// Seat holding the turn.
    pub current_turn: Role,
    /// This client's phase.
    pub phase: TurnPhase,
    /// Pieces on the board.
    pub pieces: Vec<PieceView>,
    /// Selected square, if any.
    pub selected: Option<Coord>,
    /// Squares the active piece may move or capture to.
    pub targets: Vec<Coord>,
    /// Open capture chain.
    pub pending: Option<PendingChain>,
    /// Remaining clock time.
    pub clocks: ClockPair,
    /// Captured pieces.
    pub captures: CaptureLedger,
    /// Most recent action.
    pub last_move: Option<MoveLogEntry>,
    /// Whether the peer is connected.
    pub peer_connected: bool,
    /// Seconds before the relay forfeits a disconnected peer.
    pub forfeit_in: Option<i64>,
    /// Result, once the match is over.
    pub result: Option<MatchResult>,
}

impl MatchView {
    /// Text rendering of the board and status, rank `ranks` at the top.
    pub fn render(&self, files: u8, ranks: u8) -> String {
        let mut out = String::new();
        for rank in (1..=ranks).rev() {
            let _ = write!(out, "{:>2} ", rank);
            for file in 0..files {
                let square = Coord::new(file, rank);
                let glyph = match self.pieces.iter().find(|p| p.at == square) {
                    Some(piece) => piece.glyph(),
                    None if self.targets.contains(&square) => '*',
                    None => '.',
                };
                let marker = if self.selected == Some(square) { '>' } else { ' ' };
                let _ = write!(out, "{}{}", marker, glyph);
            }
            out.push('\n');
        }
        out.push_str("   ");
        for file in 0..files {
            let _ = write!(out, " {}", (b'A' + file) as char);
        }
        out.push('\n');

        let _ = writeln!(
            out,
            "{} {} | {} {} | you are {}",
            Role::Player1,
            format_clock(self.clocks.player1),
            Role::Player2,
            format_clock(self.clocks.player2),
            self.local_role
        );
        let _ = writeln!(out, "turn: {} ({})", self.current_turn, self.phase);
        if let Some(last) = &self.last_move {
            let _ = writeln!(
                out,
                "last: #{} {} {} {} -> {}",
                last.seq, last.player, last.piece_name, last.from, last.to
            );
        }
        if let Some(left) = self.forfeit_in {
            let _ = writeln!(out, "opponent disconnected, forfeit in {}s", left);
        }
        if let Some(result) = &self.result {
            let _ = writeln!(out, "result: {} by {}", result.outcome(), result.reason());
        }
        out
    }
}
