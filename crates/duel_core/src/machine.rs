//! The match state machine.
//!
//! One [`MatchState`] lives in each client and holds that client's optimistic
//! copy of the match. Local intents go through [`MatchState::select`],
//! [`MatchState::cancel`] and [`MatchState::commit`]; peer and relay state
//! arrives through [`MatchState::apply_snapshot`]. The oracle is only consulted
//! when a piece is selected and while a capture chain is open.

use super::chain::{CaptureChainResolver, ChainStep};
use super::clock::ClockTick;
use super::history::{CaptureLedger, MoveLog};
use super::invariants::{InvariantSet, MatchInvariants};
use super::result::ResultReason;
use super::rules::{AttackStage, RuleOracle};
use super::snapshot::{Finish, MatchSnapshot, Reconciliation, SnapshotSource};
use super::{
    Board, ClockPair, Coord, MoveCounts, MoveError, MovedFlags, Outcome, PendingChain, PieceId,
    Role, Selection, Transition, TurnPhase,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One client's view of a match.
#[derive(Clone)]
pub struct MatchState {
    oracle: Arc<dyn RuleOracle>,
    local_role: Role,
    board: Board,
    current_turn: Role,
    phase: TurnPhase,
    selection: Option<Selection>,
    pending: Option<PendingChain>,
    moved: MovedFlags,
    counts: MoveCounts,
    log: MoveLog,
    captures: CaptureLedger,
    clocks: ClockPair,
    version: u64,
    finish: Option<Finish>,
}

impl std::fmt::Debug for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchState")
            .field("local_role", &self.local_role)
            .field("current_turn", &self.current_turn)
            .field("phase", &self.phase)
            .field("pieces", &self.board.len())
            .field("moves", &self.log.len())
            .field("version", &self.version)
            .field("finish", &self.finish)
            .finish()
    }
}

/// A resolved step about to be written into the state.
enum Step {
    Move,
    Relocation,
    Attack { mandatory_used: bool },
}

impl MatchState {
    /// Starts a fresh match. Player1 holds the first turn.
    #[instrument(skip(oracle, board), fields(pieces = board.len()))]
    pub fn new(oracle: Arc<dyn RuleOracle>, local_role: Role, board: Board, clocks: ClockPair) -> Self {
        let current_turn = Role::Player1;
        let phase = if local_role == current_turn {
            TurnPhase::Select
        } else {
            TurnPhase::Locked
        };
        info!(%local_role, %phase, "Match state created");
        Self {
            oracle,
            local_role,
            board,
            current_turn,
            phase,
            selection: None,
            pending: None,
            moved: MovedFlags::default(),
            counts: MoveCounts::default(),
            log: MoveLog::new(),
            captures: CaptureLedger::default(),
            clocks,
            version: 0,
            finish: None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Accessors
    // ─────────────────────────────────────────────────────────────

    /// This client's seat.
    pub fn local_role(&self) -> Role {
        self.local_role
    }

    /// Piece positions.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Role holding the turn.
    pub fn current_turn(&self) -> Role {
        self.current_turn
    }

    /// The local client's phase.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// The active selection, if any.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// The open capture chain, if any.
    pub fn pending(&self) -> Option<&PendingChain> {
        self.pending.as_ref()
    }

    /// Has-moved flags.
    pub fn moved(&self) -> &MovedFlags {
        &self.moved
    }

    /// Move counts.
    pub fn counts(&self) -> &MoveCounts {
        &self.counts
    }

    /// The move log.
    pub fn log(&self) -> &MoveLog {
        &self.log
    }

    /// The capture ledger.
    pub fn captures(&self) -> &CaptureLedger {
        &self.captures
    }

    /// Both clocks.
    pub fn clocks(&self) -> &ClockPair {
        &self.clocks
    }

    /// Local action counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// How the match finished, if it has.
    pub fn finish(&self) -> Option<&Finish> {
        self.finish.as_ref()
    }

    /// The oracle this match consults.
    pub fn oracle(&self) -> &dyn RuleOracle {
        self.oracle.as_ref()
    }

    /// Whether a result froze the match.
    pub fn is_frozen(&self) -> bool {
        self.finish.is_some()
    }

    /// Phase a role effectively has. Anyone not holding the turn is locked.
    pub fn effective_phase(&self, role: Role) -> TurnPhase {
        if self.is_frozen() || role != self.current_turn {
            TurnPhase::Locked
        } else if role == self.local_role {
            self.phase
        } else {
            TurnPhase::Select
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Local intents
    // ─────────────────────────────────────────────────────────────

    /// Selects the own piece on `at` and asks the oracle where it may go.
    ///
    /// Picking another piece while in `action` replaces the selection.
    #[instrument(skip(self), fields(role = %self.local_role, phase = %self.phase))]
    pub fn select(&mut self, at: Coord) -> Result<&Selection, MoveError> {
        self.ensure_turn()?;
        if !self.phase.accepts_selection() {
            debug!("Selection refused");
            return Err(MoveError::WrongPhase(self.phase));
        }
        let piece = self
            .board
            .piece_at(&at)
            .cloned()
            .ok_or(MoveError::NoPiece(at))?;
        if self.oracle.piece_owner(&piece) != Some(self.local_role) {
            return Err(MoveError::NotYourPiece(at));
        }

        let first_move = !self.moved.has_moved(&piece);
        let moves = self
            .oracle
            .legal_moves(&piece, &at, first_move, &self.board, &self.counts);
        let attacks =
            self.oracle
                .legal_attacks(&piece, &at, &self.board, AttackStage::PreMove, true);
        debug!(
            piece = %piece,
            simple = moves.simple.len(),
            advance = moves.advance.len(),
            attacks = attacks.len(),
            "Piece selected"
        );

        self.phase = TurnPhase::Action;
        Ok(self.selection.insert(Selection {
            piece,
            from: at,
            moves,
            attacks,
        }))
    }

    /// Drops the selection and returns to `select`.
    #[instrument(skip(self), fields(phase = %self.phase))]
    pub fn cancel(&mut self) -> Result<(), MoveError> {
        self.ensure_turn()?;
        match self.phase {
            TurnPhase::Action => {
                self.selection = None;
                self.phase = TurnPhase::Select;
                debug!("Selection cancelled");
                Ok(())
            }
            TurnPhase::Select => Ok(()),
            other => Err(MoveError::WrongPhase(other)),
        }
    }

    /// Moves or captures onto `target` with the active piece.
    ///
    /// A refused commit leaves the state untouched.
    #[instrument(skip(self), fields(role = %self.local_role, phase = %self.phase))]
    pub fn commit(&mut self, target: Coord) -> Result<Transition, MoveError> {
        self.ensure_turn()?;
        let (piece, from, step) = match self.phase {
            TurnPhase::Action => {
                let selection = self.selection.as_ref().ok_or(MoveError::WrongPhase(self.phase))?;
                let step = if selection.can_attack(&target) {
                    Step::Attack {
                        mandatory_used: false,
                    }
                } else if selection.can_move(&target) {
                    Step::Move
                } else {
                    debug!(%target, "Target outside legal set");
                    return Err(MoveError::IllegalTarget(target));
                };
                (selection.piece.clone(), selection.from, step)
            }
            TurnPhase::MandatoryMove => {
                let chain = self.pending.as_ref().ok_or(MoveError::WrongPhase(self.phase))?;
                let step = if chain.attacks.contains(&target) {
                    Step::Attack {
                        mandatory_used: chain.mandatory_used,
                    }
                } else if chain.moves.contains(&target) {
                    Step::Relocation
                } else {
                    debug!(%target, "Target outside chain options");
                    return Err(MoveError::IllegalTarget(target));
                };
                (chain.piece.clone(), chain.at, step)
            }
            other => return Err(MoveError::WrongPhase(other)),
        };

        let transition = match step {
            Step::Attack { mandatory_used } => {
                self.resolve_attack(&piece, from, target, mandatory_used)?
            }
            Step::Move => {
                self.record_step(&piece, from, target);
                self.board.place(piece.clone(), target);
                let next = CaptureChainResolver::new(self.oracle.as_ref())
                    .after_move(&piece, &target, &self.board);
                self.continue_or_pass(next)
            }
            Step::Relocation => {
                self.record_step(&piece, from, target);
                self.board.place(piece.clone(), target);
                let next = CaptureChainResolver::new(self.oracle.as_ref()).after_relocation(
                    &piece,
                    &target,
                    &self.board,
                    &self.counts,
                );
                self.continue_or_pass(next)
            }
        };

        info!(
            piece = %piece,
            %from,
            to = %target,
            ?transition,
            seq = self.log.len(),
            "Action committed"
        );

        #[cfg(debug_assertions)]
        self.check_invariants()?;

        Ok(transition)
    }

    fn resolve_attack(
        &mut self,
        piece: &PieceId,
        from: Coord,
        target: Coord,
        mandatory_used: bool,
    ) -> Result<Transition, MoveError> {
        let outcome = self
            .oracle
            .execute_attack(&target, &self.board, piece)
            .ok_or(MoveError::IllegalTarget(target))?;

        self.record_step(piece, from, target);
        self.board = outcome.board;
        self.captures.record(self.local_role, outcome.captured.clone());
        debug!(captured = %outcome.captured, "Piece captured");

        if let Some((winner, condition)) = outcome.winner {
            self.freeze(Outcome::Winner(winner), ResultReason::from(condition));
            return Ok(Transition::Won { winner, condition });
        }

        let next = CaptureChainResolver::new(self.oracle.as_ref()).after_attack(
            piece,
            &target,
            &self.board,
            mandatory_used,
            &self.counts,
        );
        Ok(self.continue_or_pass(next))
    }

    fn record_step(&mut self, piece: &PieceId, from: Coord, to: Coord) {
        let name = self.oracle.display_name(piece);
        self.log.append(self.local_role, piece.clone(), name, from, to);
        self.moved.mark(piece);
        self.counts.increment(piece);
        self.version += 1;
    }

    fn continue_or_pass(&mut self, next: ChainStep) -> Transition {
        self.selection = None;
        match next {
            ChainStep::Continue(chain) => {
                self.pending = Some(chain);
                self.phase = TurnPhase::MandatoryMove;
                Transition::Continued
            }
            ChainStep::Finished => {
                self.pending = None;
                self.current_turn = self.local_role.opponent();
                self.phase = TurnPhase::Locked;
                Transition::TurnPassed
            }
        }
    }

    fn ensure_turn(&self) -> Result<(), MoveError> {
        if self.is_frozen() {
            return Err(MoveError::MatchOver);
        }
        if self.current_turn != self.local_role {
            return Err(MoveError::NotYourTurn(self.current_turn));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    //  Results and clocks
    // ─────────────────────────────────────────────────────────────

    /// Sets the result and freezes board, ledgers and phase.
    ///
    /// Returns false if the match was already frozen.
    #[instrument(skip(self))]
    pub fn freeze(&mut self, outcome: Outcome, reason: ResultReason) -> bool {
        if self.is_frozen() {
            debug!("Already frozen");
            return false;
        }
        info!(%outcome, %reason, "Match frozen");
        self.finish = Some(Finish { outcome, reason });
        self.phase = TurnPhase::Locked;
        self.selection = None;
        self.pending = None;
        true
    }

    /// Runs the turn owner's clock down by one second.
    ///
    /// Nothing runs while frozen or while a sync is in flight. Reaching zero
    /// freezes the match with the other role winning on time.
    pub fn tick_clock(&mut self, syncing: bool) -> ClockTick {
        if self.is_frozen() || syncing {
            return ClockTick::Idle;
        }
        let tick = self.clocks.tick(self.current_turn);
        if let ClockTick::Expired(loser) = tick {
            self.freeze(Outcome::Winner(loser.opponent()), ResultReason::Timeout);
        }
        tick
    }

    // ─────────────────────────────────────────────────────────────
    //  Snapshots
    // ─────────────────────────────────────────────────────────────

    /// Complete outbound snapshot. The phase declared is the turn owner's.
    pub fn snapshot(&self) -> MatchSnapshot {
        let owner_is_local = self.current_turn == self.local_role;
        MatchSnapshot {
            board: self.board.clone(),
            current_turn: self.current_turn,
            phase: if owner_is_local {
                self.phase
            } else {
                TurnPhase::Select
            },
            move_log: self.log.clone(),
            captures: self.captures.clone(),
            moved: self.moved.clone(),
            counts: self.counts.clone(),
            clocks: self.clocks,
            pending: if owner_is_local {
                self.pending.clone()
            } else {
                None
            },
            version: self.version,
            finish: self.finish,
        }
    }

    /// Replaces local state with an inbound snapshot.
    ///
    /// Board, turn, log and ledgers are replaced. Has-moved flags are unioned
    /// and counts keep the maximum so neither ever goes backwards. Server
    /// snapshots replace the clocks; peer moves may only lower them.
    #[instrument(skip(self, snapshot), fields(version = snapshot.version, turn = %snapshot.current_turn))]
    pub fn apply_snapshot(
        &mut self,
        snapshot: MatchSnapshot,
        source: SnapshotSource,
    ) -> Reconciliation {
        if self.is_frozen() {
            debug!(%source, "Snapshot after result ignored");
            return Reconciliation::Ignored;
        }

        let diverged = source == SnapshotSource::PeerMove && snapshot.version <= self.version;
        if diverged {
            warn!(
                local = self.version,
                remote = snapshot.version,
                "Peer snapshot did not advance, applying anyway"
            );
        }

        self.board = snapshot.board;
        self.current_turn = snapshot.current_turn;
        self.log = snapshot.move_log;
        self.captures = snapshot.captures;
        self.moved.absorb(&snapshot.moved);
        self.counts.merge_max(&snapshot.counts);
        match source {
            SnapshotSource::Server => self.clocks = snapshot.clocks,
            SnapshotSource::PeerMove => self.clocks.merge_min(&snapshot.clocks),
        }
        self.version = self.version.max(snapshot.version);
        self.selection = None;
        self.pending = None;
        self.phase = self.derive_phase(snapshot.phase, snapshot.pending.as_ref());
        debug!(phase = %self.phase, "Snapshot applied");

        if let Some(finish) = snapshot.finish {
            self.freeze(finish.outcome, finish.reason);
            return Reconciliation::Finished(finish);
        }
        Reconciliation::Applied { diverged }
    }

    fn derive_phase(&mut self, declared: TurnPhase, chain: Option<&PendingChain>) -> TurnPhase {
        if self.current_turn != self.local_role {
            return TurnPhase::Locked;
        }
        match declared {
            TurnPhase::Locked => TurnPhase::Locked,
            TurnPhase::MandatoryMove => {
                let resumed = chain.map(|chain| {
                    CaptureChainResolver::new(self.oracle.as_ref()).resume(
                        chain,
                        &self.board,
                        &self.counts,
                    )
                });
                match resumed {
                    Some(ChainStep::Continue(chain)) => {
                        self.pending = Some(chain);
                        TurnPhase::MandatoryMove
                    }
                    _ => {
                        warn!("Declared chain has nothing left, falling back to select");
                        TurnPhase::Select
                    }
                }
            }
            _ => TurnPhase::Select,
        }
    }

    /// Checks the match invariants.
    pub fn check_invariants(&self) -> Result<(), MoveError> {
        MatchInvariants::check_all(self).map_err(|violations| {
            let descriptions = violations
                .iter()
                .map(|v| v.description.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            MoveError::InvariantViolation(descriptions)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{GridOracle, RuleTable};

    fn c(s: &str) -> Coord {
        s.parse().unwrap()
    }

    fn state(role: Role, pieces: &[(&str, &str)]) -> MatchState {
        let board = pieces
            .iter()
            .map(|(id, at)| (PieceId::new(*id), c(at)))
            .collect();
        MatchState::new(
            Arc::new(GridOracle::new(RuleTable::standard())),
            role,
            board,
            ClockPair::new(600),
        )
    }

    #[test]
    fn test_second_player_starts_locked() {
        let match_state = state(Role::Player2, &[("p1_warden_1", "E1")]);
        assert_eq!(match_state.phase(), TurnPhase::Locked);
        assert_eq!(match_state.effective_phase(Role::Player2), TurnPhase::Locked);
        assert_eq!(match_state.effective_phase(Role::Player1), TurnPhase::Select);
    }

    #[test]
    fn test_select_refuses_enemy_and_empty() {
        let mut match_state = state(Role::Player1, &[("p1_lancer_1", "B3"), ("p2_lancer_1", "B7")]);
        assert_eq!(
            match_state.select(c("B7")).unwrap_err(),
            MoveError::NotYourPiece(c("B7"))
        );
        assert_eq!(
            match_state.select(c("C3")).unwrap_err(),
            MoveError::NoPiece(c("C3"))
        );
        assert_eq!(match_state.phase(), TurnPhase::Select);
    }

    #[test]
    fn test_cancel_returns_to_select() {
        let mut match_state = state(Role::Player1, &[("p1_lancer_1", "B3"), ("p2_lancer_1", "B7")]);
        match_state.select(c("B3")).unwrap();
        assert_eq!(match_state.phase(), TurnPhase::Action);
        match_state.cancel().unwrap();
        assert_eq!(match_state.phase(), TurnPhase::Select);
        assert!(match_state.selection().is_none());
    }

    #[test]
    fn test_simple_move_passes_turn() {
        let mut match_state = state(Role::Player1, &[("p1_lancer_1", "B3"), ("p2_lancer_1", "H7")]);
        match_state.select(c("B3")).unwrap();
        assert_eq!(match_state.commit(c("B4")).unwrap(), Transition::TurnPassed);
        assert_eq!(match_state.current_turn(), Role::Player2);
        assert_eq!(match_state.phase(), TurnPhase::Locked);
        assert!(match_state.moved().has_moved(&PieceId::new("p1_lancer_1")));
        assert_eq!(match_state.version(), 1);
    }

    #[test]
    fn test_illegal_target_leaves_state_untouched() {
        let mut match_state = state(Role::Player1, &[("p1_lancer_1", "B3"), ("p2_lancer_1", "H7")]);
        match_state.select(c("B3")).unwrap();
        let before = match_state.snapshot();
        assert_eq!(
            match_state.commit(c("B6")).unwrap_err(),
            MoveError::IllegalTarget(c("B6"))
        );
        assert_eq!(match_state.snapshot(), before);
        assert_eq!(match_state.phase(), TurnPhase::Action);
    }

    #[test]
    fn test_follow_up_opens_mandatory_chain() {
        let mut match_state = state(
            Role::Player1,
            &[("p1_lancer_1", "D4"), ("p2_lancer_1", "E6"), ("p2_warden_1", "I9")],
        );
        match_state.select(c("D4")).unwrap();
        assert_eq!(match_state.commit(c("D5")).unwrap(), Transition::Continued);
        assert_eq!(match_state.phase(), TurnPhase::MandatoryMove);
        assert_eq!(match_state.current_turn(), Role::Player1);
        assert_eq!(match_state.cancel().unwrap_err(), MoveError::WrongPhase(TurnPhase::MandatoryMove));
        assert_eq!(match_state.commit(c("E6")).unwrap(), Transition::TurnPassed);
        assert_eq!(match_state.captures().by(Role::Player1).len(), 1);
    }

    #[test]
    fn test_outbound_snapshot_declares_owner_phase() {
        let mut match_state = state(Role::Player1, &[("p1_lancer_1", "B3"), ("p2_lancer_1", "H7")]);
        match_state.select(c("B3")).unwrap();
        match_state.commit(c("B4")).unwrap();
        let snapshot = match_state.snapshot();
        assert_eq!(snapshot.current_turn, Role::Player2);
        assert_eq!(snapshot.phase, TurnPhase::Select);
        assert!(snapshot.pending.is_none());
    }

    #[test]
    fn test_timeout_freezes_with_opponent_winning() {
        let board: Board = [(PieceId::new("p1_warden_1"), c("E1"))].into_iter().collect();
        let mut match_state = MatchState::new(
            Arc::new(GridOracle::new(RuleTable::standard())),
            Role::Player1,
            board,
            ClockPair::new(2),
        );
        assert_eq!(match_state.tick_clock(true), ClockTick::Idle);
        assert_eq!(match_state.tick_clock(false), ClockTick::Running(1));
        assert_eq!(match_state.tick_clock(false), ClockTick::Expired(Role::Player1));
        let finish = match_state.finish().unwrap();
        assert_eq!(finish.outcome, Outcome::Winner(Role::Player2));
        assert_eq!(finish.reason, ResultReason::Timeout);
        assert_eq!(match_state.tick_clock(false), ClockTick::Idle);
    }
}
