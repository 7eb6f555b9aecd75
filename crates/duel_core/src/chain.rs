//! Capture chain resolution.
//!
//! After a piece captures, moves or relocates, the resolver asks the oracle
//! what the same piece still owes this turn. Captures always outrank forced
//! relocations, and either outranks ending the turn.

use super::rules::{AttackStage, CaptureOptions, RuleOracle};
use super::{Board, Coord, MoveCounts, PendingChain, PieceId};
use tracing::{debug, instrument};

/// Whether the turn keeps going after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    /// The piece must act again with these options.
    Continue(PendingChain),
    /// Nothing is owed; the turn may pass.
    Finished,
}

impl ChainStep {
    /// Returns true if the turn continues.
    pub fn continues(&self) -> bool {
        matches!(self, ChainStep::Continue(_))
    }
}

/// Decides continuation after each action of a turn.
#[derive(Clone, Copy)]
pub struct CaptureChainResolver<'a> {
    oracle: &'a dyn RuleOracle,
}

impl<'a> CaptureChainResolver<'a> {
    /// Creates a resolver over an oracle.
    pub fn new(oracle: &'a dyn RuleOracle) -> Self {
        Self { oracle }
    }

    /// Continuation after a capture landed the piece on `at`.
    ///
    /// Win detection happens before this is called; a winning capture never
    /// reaches the resolver.
    #[instrument(skip(self, board, counts), fields(piece = %piece, at = %at))]
    pub fn after_attack(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        mandatory_used: bool,
        counts: &MoveCounts,
    ) -> ChainStep {
        let options = self
            .oracle
            .multi_capture_options(piece, at, board, mandatory_used, counts);
        Self::prioritise(piece, at, options, mandatory_used)
    }

    /// Continuation after a simple or advance move landed the piece on `at`.
    ///
    /// Only follow-up captures count; a follow-up chain never owes a relocation.
    #[instrument(skip(self, board), fields(piece = %piece, at = %at))]
    pub fn after_move(&self, piece: &PieceId, at: &Coord, board: &Board) -> ChainStep {
        let attacks = self
            .oracle
            .legal_attacks(piece, at, board, AttackStage::PostMove, false);
        let options = CaptureOptions {
            moves: Vec::new(),
            attacks,
        };
        Self::prioritise(piece, at, options, true)
    }

    /// Continuation after the forced relocation was taken.
    #[instrument(skip(self, board, counts), fields(piece = %piece, at = %at))]
    pub fn after_relocation(
        &self,
        piece: &PieceId,
        at: &Coord,
        board: &Board,
        counts: &MoveCounts,
    ) -> ChainStep {
        self.after_attack(piece, at, board, true, counts)
    }

    /// Recomputes an open chain against a board received from elsewhere.
    ///
    /// The chain's own options are not trusted; the piece may have been
    /// captured or its surroundings may differ.
    #[instrument(skip(self, chain, board, counts), fields(piece = %chain.piece))]
    pub fn resume(&self, chain: &PendingChain, board: &Board, counts: &MoveCounts) -> ChainStep {
        let Some(at) = board.position_of(&chain.piece) else {
            debug!("Chain piece no longer on board");
            return ChainStep::Finished;
        };
        self.after_attack(&chain.piece, &at, board, chain.mandatory_used, counts)
    }

    fn prioritise(
        piece: &PieceId,
        at: &Coord,
        mut options: CaptureOptions,
        mandatory_used: bool,
    ) -> ChainStep {
        if !options.attacks.is_empty() {
            options.moves.clear();
        }
        let chain = PendingChain::new(piece.clone(), *at, options, mandatory_used);
        if chain.is_exhausted() {
            debug!("Chain exhausted");
            ChainStep::Finished
        } else {
            debug!(
                attacks = chain.attacks.len(),
                moves = chain.moves.len(),
                "Chain continues"
            );
            ChainStep::Continue(chain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{GridOracle, RuleTable};

    fn c(s: &str) -> Coord {
        s.parse().unwrap()
    }

    fn board(pieces: &[(&str, &str)]) -> Board {
        pieces
            .iter()
            .map(|(id, at)| (PieceId::new(*id), c(at)))
            .collect()
    }

    #[test]
    fn test_attacks_clear_relocations() {
        let oracle = GridOracle::new(RuleTable::standard());
        let resolver = CaptureChainResolver::new(&oracle);
        let b = board(&[("p1_striker_1", "E5"), ("p2_lancer_1", "E7")]);
        let step = resolver.after_attack(
            &PieceId::new("p1_striker_1"),
            &c("E5"),
            &b,
            false,
            &MoveCounts::default(),
        );
        let ChainStep::Continue(chain) = step else {
            panic!("Expected continuation");
        };
        assert_eq!(chain.attacks, vec![c("E7")]);
        assert!(chain.moves.is_empty());
    }

    #[test]
    fn test_relocation_owed_without_attacks() {
        let oracle = GridOracle::new(RuleTable::standard());
        let resolver = CaptureChainResolver::new(&oracle);
        let b = board(&[("p1_striker_1", "E5"), ("p2_lancer_1", "A9")]);
        let step = resolver.after_attack(
            &PieceId::new("p1_striker_1"),
            &c("E5"),
            &b,
            false,
            &MoveCounts::default(),
        );
        let ChainStep::Continue(chain) = step else {
            panic!("Expected forced relocation");
        };
        assert_eq!(chain.moves, vec![c("E4")]);
        assert!(!chain.mandatory_used);
    }

    #[test]
    fn test_relocation_spent_finishes() {
        let oracle = GridOracle::new(RuleTable::standard());
        let resolver = CaptureChainResolver::new(&oracle);
        let b = board(&[("p1_striker_1", "E4"), ("p2_lancer_1", "A9")]);
        let step = resolver.after_relocation(
            &PieceId::new("p1_striker_1"),
            &c("E4"),
            &b,
            &MoveCounts::default(),
        );
        assert_eq!(step, ChainStep::Finished);
    }

    #[test]
    fn test_follow_up_after_move() {
        let oracle = GridOracle::new(RuleTable::standard());
        let resolver = CaptureChainResolver::new(&oracle);
        let b = board(&[("p1_lancer_1", "D5"), ("p2_lancer_1", "E6")]);
        let step = resolver.after_move(&PieceId::new("p1_lancer_1"), &c("D5"), &b);
        let ChainStep::Continue(chain) = step else {
            panic!("Expected follow-up");
        };
        assert_eq!(chain.attacks, vec![c("E6")]);
        assert!(chain.mandatory_used);
    }

    #[test]
    fn test_resume_finishes_when_piece_gone() {
        let oracle = GridOracle::new(RuleTable::standard());
        let resolver = CaptureChainResolver::new(&oracle);
        let chain = PendingChain {
            piece: PieceId::new("p1_striker_1"),
            at: c("E5"),
            moves: Vec::new(),
            attacks: vec![c("E7")],
            mandatory_used: false,
        };
        let b = board(&[("p2_lancer_1", "E7")]);
        assert_eq!(
            resolver.resume(&chain, &b, &MoveCounts::default()),
            ChainStep::Finished
        );
    }
}
