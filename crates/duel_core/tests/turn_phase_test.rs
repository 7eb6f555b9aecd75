//! Tests for the turn phase state machine and capture chains.

use duel_core::{
    Board, ClockPair, Coord, GridOracle, MatchState, MoveError, Outcome, PieceId, ResultReason,
    Role, RuleTable, Transition, TurnPhase, WinCondition,
};
use std::sync::Arc;

fn c(s: &str) -> Coord {
    s.parse().expect("Valid coordinate")
}

fn board(pieces: &[(&str, &str)]) -> Board {
    pieces
        .iter()
        .map(|(id, at)| (PieceId::new(*id), c(at)))
        .collect()
}

/// A table with a long-reach piece that owes nothing after capturing.
fn pike_table() -> RuleTable {
    RuleTable::from_toml(
        r#"
        [pieces.warden]
        name = "Warden"
        steps = [[0, 1], [0, -1], [1, 0], [-1, 0]]
        attacks = [[0, 1], [0, -1], [1, 0], [-1, 0]]
        commander = true

        [pieces.pike]
        name = "Pike"
        steps = [[0, 1]]
        attacks = [[0, 1]]
        attack_range = 2
        chain = true
        "#,
    )
    .expect("Valid table")
}

fn match_with(table: RuleTable, role: Role, pieces: &[(&str, &str)]) -> MatchState {
    MatchState::new(
        Arc::new(GridOracle::new(table)),
        role,
        board(pieces),
        ClockPair::new(600),
    )
}

#[test]
fn test_capture_without_continuation_passes_turn() {
    let mut state = match_with(
        pike_table(),
        Role::Player1,
        &[
            ("p1_pike_1", "E7"),
            ("p2_pike_1", "E9"),
            ("p1_warden_1", "A1"),
            ("p2_warden_1", "I9"),
        ],
    );

    let selection = state.select(c("E7")).expect("Own piece");
    assert_eq!(selection.attacks, vec![c("E9")]);

    let transition = state.commit(c("E9")).expect("Legal capture");
    assert_eq!(transition, Transition::TurnPassed);
    assert_eq!(state.board().position_of(&PieceId::new("p2_pike_1")), None);
    assert_eq!(
        state.board().position_of(&PieceId::new("p1_pike_1")),
        Some(c("E9"))
    );
    assert_eq!(state.captures().by(Role::Player1), &[PieceId::new("p2_pike_1")]);
    assert_eq!(state.phase(), TurnPhase::Locked);
    assert_eq!(state.current_turn(), Role::Player2);
}

#[test]
fn test_non_active_player_is_locked() {
    let mut state = match_with(
        pike_table(),
        Role::Player2,
        &[("p1_pike_1", "E2"), ("p2_pike_1", "E8")],
    );
    assert_eq!(state.effective_phase(Role::Player2), TurnPhase::Locked);
    assert!(matches!(
        state.select(c("E8")),
        Err(MoveError::NotYourTurn(Role::Player1))
    ));
    assert!(matches!(
        state.commit(c("E7")),
        Err(MoveError::NotYourTurn(Role::Player1))
    ));
}

#[test]
fn test_commit_refused_in_select() {
    let mut state = match_with(
        pike_table(),
        Role::Player1,
        &[("p1_pike_1", "E2"), ("p2_pike_1", "E8")],
    );
    assert_eq!(
        state.commit(c("E3")),
        Err(MoveError::WrongPhase(TurnPhase::Select))
    );
}

#[test]
fn test_further_capture_keeps_turn() {
    let mut state = match_with(
        RuleTable::standard(),
        Role::Player1,
        &[
            ("p1_striker_1", "E3"),
            ("p2_lancer_1", "E5"),
            ("p2_lancer_2", "E7"),
            ("p2_warden_1", "A9"),
        ],
    );
    state.select(c("E3")).expect("Own piece");
    assert_eq!(state.commit(c("E5")), Ok(Transition::Continued));
    assert_eq!(state.phase(), TurnPhase::MandatoryMove);
    assert_eq!(state.current_turn(), Role::Player1);

    let chain = state.pending().expect("Open chain");
    assert_eq!(chain.attacks, vec![c("E7")]);
    assert!(chain.moves.is_empty());

    // Selecting another piece is not an escape from the chain.
    assert_eq!(
        state.select(c("E5")).map(|_| ()),
        Err(MoveError::WrongPhase(TurnPhase::MandatoryMove))
    );
    assert_eq!(
        state.commit(c("E4")),
        Err(MoveError::IllegalTarget(c("E4")))
    );

    assert_eq!(state.commit(c("E7")), Ok(Transition::Continued));
    let chain = state.pending().expect("Relocation owed");
    assert_eq!(chain.moves, vec![c("E6")]);
    assert_eq!(state.commit(c("E6")), Ok(Transition::TurnPassed));
    assert_eq!(state.phase(), TurnPhase::Locked);
    assert_eq!(state.log().len(), 3);
}

#[test]
fn test_commander_capture_wins_despite_chain() {
    let mut state = match_with(
        RuleTable::standard(),
        Role::Player1,
        &[
            ("p1_striker_1", "E3"),
            ("p2_warden_1", "E4"),
            ("p2_lancer_1", "E6"),
        ],
    );
    state.select(c("E3")).expect("Own piece");
    assert_eq!(
        state.commit(c("E4")),
        Ok(Transition::Won {
            winner: Role::Player1,
            condition: WinCondition::CommanderCaptured,
        })
    );
    let finish = state.finish().expect("Finished");
    assert_eq!(finish.outcome, Outcome::Winner(Role::Player1));
    assert_eq!(finish.reason, ResultReason::CommanderCaptured);
}

#[test]
fn test_result_freezes_board() {
    let mut state = match_with(
        RuleTable::standard(),
        Role::Player1,
        &[("p1_lancer_1", "B3"), ("p2_lancer_1", "H7")],
    );
    state.select(c("B3")).expect("Own piece");
    assert!(state.freeze(Outcome::Winner(Role::Player2), ResultReason::Resignation));
    let before = state.board().clone();

    assert_eq!(state.commit(c("B4")), Err(MoveError::MatchOver));
    assert_eq!(state.select(c("B3")).map(|_| ()), Err(MoveError::MatchOver));
    assert_eq!(state.board(), &before);
    assert_eq!(state.phase(), TurnPhase::Locked);
    assert!(!state.freeze(Outcome::Draw, ResultReason::Draw));
}

#[test]
fn test_reselect_replaces_selection() {
    let mut state = match_with(
        RuleTable::standard(),
        Role::Player1,
        &[("p1_lancer_1", "B3"), ("p1_lancer_2", "D3"), ("p2_lancer_1", "H7")],
    );
    state.select(c("B3")).expect("Own piece");
    let selection = state.select(c("D3")).expect("Reselect");
    assert_eq!(selection.piece, PieceId::new("p1_lancer_2"));
    assert_eq!(selection.moves.simple, vec![c("D4")]);
}

#[test]
fn test_log_stays_contiguous_across_peers() {
    let table = RuleTable::standard();
    let start = table.initial_board();
    let oracle = Arc::new(GridOracle::new(table));
    let mut p1 = MatchState::new(oracle.clone(), Role::Player1, start.clone(), ClockPair::new(600));
    let mut p2 = MatchState::new(oracle, Role::Player2, start, ClockPair::new(600));

    p1.select(c("B3")).expect("Own piece");
    p1.commit(c("B4")).expect("Legal move");
    p2.apply_snapshot(p1.snapshot(), duel_core::SnapshotSource::PeerMove);
    assert_eq!(p2.phase(), TurnPhase::Select);

    p2.select(c("H7")).expect("Own piece");
    p2.commit(c("H6")).expect("Legal move");
    p1.apply_snapshot(p2.snapshot(), duel_core::SnapshotSource::PeerMove);
    assert_eq!(p1.phase(), TurnPhase::Select);

    // The lancer has moved, so its advance step is now open.
    let selection = p1.select(c("B4")).expect("Own piece");
    assert_eq!(selection.moves.advance, vec![c("B6")]);
    p1.commit(c("B6")).expect("Advance move");

    let seqs: Vec<u32> = p1.log().entries().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(p1.log().entries()[1].player, Role::Player2);
    assert_eq!(p1.log().entries()[0].piece_name, "Lancer");
}
