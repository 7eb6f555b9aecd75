//! Tests for snapshot reconciliation between peers and the relay.

use duel_core::{
    ClockPair, Coord, Finish, GridOracle, MatchSnapshot, MatchState, Outcome, PieceId,
    Reconciliation, ResultReason, Role, RuleTable, SnapshotSource, TurnPhase,
};
use std::sync::Arc;

fn c(s: &str) -> Coord {
    s.parse().expect("Valid coordinate")
}

fn pair() -> (MatchState, MatchState) {
    let table = RuleTable::standard();
    let start = table.initial_board();
    let oracle = Arc::new(GridOracle::new(table));
    (
        MatchState::new(oracle.clone(), Role::Player1, start.clone(), ClockPair::new(600)),
        MatchState::new(oracle, Role::Player2, start, ClockPair::new(600)),
    )
}

fn after_first_move() -> (MatchState, MatchState, MatchSnapshot) {
    let (mut p1, p2) = pair();
    p1.select(c("D3")).expect("Own piece");
    p1.commit(c("D4")).expect("Legal move");
    let snapshot = p1.snapshot();
    (p1, p2, snapshot)
}

#[test]
fn test_full_snapshot_is_idempotent() {
    let (_, mut p2, snapshot) = after_first_move();

    p2.apply_snapshot(snapshot.clone(), SnapshotSource::Server);
    let board = p2.board().clone();
    let phase = p2.phase();
    let captures = p2.captures().clone();
    let log = p2.log().clone();

    p2.apply_snapshot(snapshot, SnapshotSource::Server);
    assert_eq!(p2.board(), &board);
    assert_eq!(p2.phase(), phase);
    assert_eq!(p2.captures(), &captures);
    assert_eq!(p2.log(), &log);
}

#[test]
fn test_reconnect_on_opponents_turn_locks() {
    let (mut p1, _, mut snapshot) = after_first_move();
    // p1 has passed the turn; a relay snapshot may still declare anything.
    snapshot.phase = TurnPhase::Action;
    p1.apply_snapshot(snapshot, SnapshotSource::Server);
    assert_eq!(p1.current_turn(), Role::Player2);
    assert_eq!(p1.phase(), TurnPhase::Locked);
}

#[test]
fn test_peer_move_unlocks_receiver() {
    let (_, mut p2, snapshot) = after_first_move();
    let outcome = p2.apply_snapshot(snapshot, SnapshotSource::PeerMove);
    assert_eq!(outcome, Reconciliation::Applied { diverged: false });
    assert_eq!(p2.phase(), TurnPhase::Select);
    assert_eq!(
        p2.board().position_of(&PieceId::new("p1_lancer_2")),
        Some(c("D4"))
    );
}

#[test]
fn test_replayed_peer_move_is_flagged() {
    let (_, mut p2, snapshot) = after_first_move();
    p2.apply_snapshot(snapshot.clone(), SnapshotSource::PeerMove);
    assert_eq!(
        p2.apply_snapshot(snapshot, SnapshotSource::PeerMove),
        Reconciliation::Applied { diverged: true }
    );
}

#[test]
fn test_moved_flags_survive_stale_snapshot() {
    let (p1, mut p2, fresh) = after_first_move();
    p2.apply_snapshot(fresh, SnapshotSource::PeerMove);
    assert!(p2.moved().has_moved(&PieceId::new("p1_lancer_2")));

    let (_, stale_source) = pair();
    let mut stale = stale_source.snapshot();
    stale.current_turn = Role::Player2;
    p2.apply_snapshot(stale, SnapshotSource::Server);
    assert!(p2.moved().has_moved(&PieceId::new("p1_lancer_2")));
    assert!(p2.moved().covers(p1.moved()));
}

#[test]
fn test_peer_clocks_never_wind_back_up() {
    let (_, mut p2, mut snapshot) = after_first_move();
    for _ in 0..5 {
        p2.tick_clock(false);
    }
    assert_eq!(p2.clocks().player1, 595);

    snapshot.clocks = ClockPair::new(600);
    p2.apply_snapshot(snapshot.clone(), SnapshotSource::PeerMove);
    assert_eq!(p2.clocks().player1, 595);

    p2.apply_snapshot(snapshot, SnapshotSource::Server);
    assert_eq!(p2.clocks().player1, 600);
}

#[test]
fn test_mandatory_chain_resumes_from_snapshot() {
    let table = RuleTable::standard();
    let oracle = Arc::new(GridOracle::new(table));
    let start = [
        (PieceId::new("p1_lancer_1"), c("D4")),
        (PieceId::new("p2_lancer_1"), c("E6")),
        (PieceId::new("p2_warden_1"), c("I9")),
    ]
    .into_iter()
    .collect();
    let mut p1 = MatchState::new(oracle.clone(), Role::Player1, start, ClockPair::new(600));
    p1.select(c("D4")).expect("Own piece");
    p1.commit(c("D5")).expect("Legal move");
    let snapshot = p1.snapshot();
    assert_eq!(snapshot.phase, TurnPhase::MandatoryMove);

    // The same player on a second device picks the chain back up.
    let mut rejoined = MatchState::new(
        oracle,
        Role::Player1,
        Default::default(),
        ClockPair::new(600),
    );
    rejoined.apply_snapshot(snapshot, SnapshotSource::Server);
    assert_eq!(rejoined.phase(), TurnPhase::MandatoryMove);
    assert_eq!(
        rejoined.pending().map(|chain| chain.attacks.clone()),
        Some(vec![c("E6")])
    );
}

#[test]
fn test_finished_snapshot_freezes_receiver() {
    let (_, mut p2, mut snapshot) = after_first_move();
    let finish = Finish {
        outcome: Outcome::Winner(Role::Player1),
        reason: ResultReason::Timeout,
    };
    snapshot.finish = Some(finish);

    assert_eq!(
        p2.apply_snapshot(snapshot.clone(), SnapshotSource::PeerMove),
        Reconciliation::Finished(finish)
    );
    assert!(p2.is_frozen());
    assert_eq!(p2.phase(), TurnPhase::Locked);
    assert_eq!(
        p2.apply_snapshot(snapshot, SnapshotSource::Server),
        Reconciliation::Ignored
    );
}

#[test]
fn test_snapshot_wire_format() {
    let (_, _, snapshot) = after_first_move();
    let json = serde_json::to_value(&snapshot).expect("Serializable");
    assert_eq!(json["currentTurn"], "player2");
    assert_eq!(json["phase"], "select");
    assert_eq!(json["board"]["p1_lancer_2"], "D4");
    assert_eq!(json["moveLog"][0]["seq"], 1);
    assert_eq!(json["moveLog"][0]["pieceName"], "Lancer");

    let back: MatchSnapshot = serde_json::from_value(json).expect("Deserializable");
    assert_eq!(back, snapshot);
}
