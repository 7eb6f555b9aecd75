//! Tests for the driver loop over the same-device channel and a scripted relay.

use duel_client::{
    AppEvent, ChannelError, Connector, Encoded, EventBus, Identity, Inbound, LocalHub,
    MatchDriver, Outbound, PlayerInfo, SnapshotPayload, Subscription, SyncSession, Transport,
};
use duel_core::{
    ClockPair, DisconnectTimer, GridOracle, Intent, MatchState, Outcome, ResultReason, Role,
    RuleTable, TurnPhase,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn session(role: Role, user_id: &str, bus: &EventBus) -> SyncSession {
    let table = RuleTable::standard();
    let board = table.initial_board();
    let state = MatchState::new(
        Arc::new(GridOracle::new(table)),
        role,
        board,
        ClockPair::new(600),
    );
    SyncSession::new(
        Identity::new(user_id.to_string(), "m1".to_string(), role, true),
        state,
        DisconnectTimer::new(chrono::Duration::seconds(60)),
        bus.clone(),
    )
}

async fn wait_for(events: &mut Subscription, mut wanted: impl FnMut(&AppEvent) -> bool) {
    timeout(WAIT, async {
        while let Some(event) = events.next().await {
            if wanted(&event) {
                return;
            }
        }
        panic!("Bus closed before the event arrived");
    })
    .await
    .expect("Event arrived in time");
}

#[tokio::test]
async fn test_local_channel_carries_moves() {
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let hub = LocalHub::default();
    let heartbeat = Duration::from_secs(5);

    let (p1, p1_commands) = MatchDriver::new(session(Role::Player1, "alice", &bus), hub.attach(), heartbeat);
    let (p2, p2_commands) = MatchDriver::new(session(Role::Player2, "bob", &bus), hub.attach(), heartbeat);
    let p1 = tokio::spawn(p1.run());
    let p2 = tokio::spawn(p2.run());

    p1_commands
        .send(Intent::Select { at: "B3".parse().unwrap() })
        .await
        .unwrap();
    p1_commands
        .send(Intent::Commit { to: "B4".parse().unwrap() })
        .await
        .unwrap();

    wait_for(&mut events, |event| {
        matches!(event, AppEvent::StateChanged(view)
            if view.local_role == Role::Player2 && view.phase == TurnPhase::Select)
    })
    .await;

    drop(p1_commands);
    drop(p2_commands);
    let p1 = timeout(WAIT, p1).await.unwrap().unwrap().unwrap();
    let p2 = timeout(WAIT, p2).await.unwrap().unwrap().unwrap();

    assert_eq!(p1.state().log(), p2.state().log());
    assert_eq!(p2.state().board(), p1.state().board());
    assert_eq!(p1.state().phase(), TurnPhase::Locked);
    assert!(!p1.is_connected());
}

#[tokio::test]
async fn test_resignation_ends_both_drivers() {
    let bus = EventBus::default();
    let hub = LocalHub::default();
    let heartbeat = Duration::from_secs(5);

    let (p1, p1_commands) = MatchDriver::new(session(Role::Player1, "alice", &bus), hub.attach(), heartbeat);
    let (p2, _p2_commands) = MatchDriver::new(session(Role::Player2, "bob", &bus), hub.attach(), heartbeat);
    let p1 = tokio::spawn(p1.run());
    let p2 = tokio::spawn(p2.run());

    p1_commands.send(Intent::Resign).await.unwrap();

    let p1 = timeout(WAIT, p1).await.unwrap().unwrap().unwrap();
    let p2 = timeout(WAIT, p2).await.unwrap().unwrap().unwrap();
    for session in [&p1, &p2] {
        let result = session.result().expect("Result recorded");
        assert_eq!(*result.outcome(), Outcome::Winner(Role::Player2));
        assert_eq!(*result.reason(), ResultReason::Resignation);
    }
}

/// Relay stand-in fed from the test.
struct ScriptedRelay {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: mpsc::UnboundedSender<Outbound>,
}

#[async_trait::async_trait]
impl Transport for ScriptedRelay {
    async fn send(&mut self, message: &Outbound) -> Result<(), ChannelError> {
        self.sent.send(message.clone()).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<Inbound, ChannelError>> {
        self.inbound.recv().await.map(Ok)
    }

    fn is_networked(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_relay_loss_keeps_session_playing() {
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let (relay_tx, inbound) = mpsc::unbounded_channel();
    let (sent, mut outbox) = mpsc::unbounded_channel();
    let relay = ScriptedRelay { inbound, sent };

    let (driver, commands) = MatchDriver::new(
        session(Role::Player1, "alice", &bus),
        relay,
        Duration::from_secs(5),
    );
    let driver = tokio::spawn(driver.run());

    let join = timeout(WAIT, outbox.recv()).await.unwrap().expect("Join sent");
    assert_eq!(join.kind(), "joinGame");

    relay_tx
        .send(Inbound::GameState {
            match_id: Some("m1".to_string()),
            players: vec![bob()],
            game: None,
            result: None,
        })
        .unwrap();
    wait_for(&mut events, |event| matches!(event, AppEvent::MatchFound { .. })).await;

    drop(relay_tx);
    wait_for(&mut events, |event| matches!(event, AppEvent::ConnectionLost)).await;

    // Play carries on offline; nothing more reaches the relay.
    commands
        .send(Intent::Select { at: "B3".parse().unwrap() })
        .await
        .unwrap();
    commands
        .send(Intent::Commit { to: "B4".parse().unwrap() })
        .await
        .unwrap();
    commands.send(Intent::Resign).await.unwrap();

    let session = timeout(WAIT, driver).await.unwrap().unwrap().unwrap();
    assert!(session.is_over());
    assert!(!session.is_connected());
    assert_eq!(session.state().log().len(), 1);
    assert!(outbox.try_recv().is_err());
}

/// Hands out prepared relays, then reports the relay as unreachable.
struct ScriptedConnector {
    ready: mpsc::UnboundedReceiver<ScriptedRelay>,
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    type Transport = ScriptedRelay;

    async fn connect(&mut self) -> Result<ScriptedRelay, ChannelError> {
        self.ready
            .try_recv()
            .map_err(|_| ChannelError::Connect("relay unreachable".to_string()))
    }
}

fn bob() -> PlayerInfo {
    PlayerInfo {
        user_id: "bob".to_string(),
        role: Role::Player2,
        rating: None,
        guest: true,
        connected: true,
        disconnected_at: None,
    }
}

#[tokio::test]
async fn test_reconnect_rejoins_and_resyncs() {
    let bus = EventBus::default();
    let mut events = bus.subscribe();

    let (first_tx, first_in) = mpsc::unbounded_channel();
    let (first_sent, mut first_out) = mpsc::unbounded_channel();
    let (second_tx, second_in) = mpsc::unbounded_channel();
    let (second_sent, mut second_out) = mpsc::unbounded_channel();
    let (ready_tx, ready) = mpsc::unbounded_channel();
    ready_tx
        .send(ScriptedRelay {
            inbound: second_in,
            sent: second_sent,
        })
        .unwrap();

    let (driver, commands) = MatchDriver::new(
        session(Role::Player1, "alice", &bus),
        ScriptedRelay {
            inbound: first_in,
            sent: first_sent,
        },
        Duration::from_secs(5),
    );
    let driver = driver.with_reconnect(ScriptedConnector { ready }, Duration::from_millis(20));
    let driver = tokio::spawn(driver.run());

    let join = timeout(WAIT, first_out.recv()).await.unwrap().expect("Join sent");
    assert_eq!(join.kind(), "joinGame");
    drop(first_tx);
    wait_for(&mut events, |event| matches!(event, AppEvent::ConnectionLost)).await;

    let rejoin = timeout(WAIT, second_out.recv())
        .await
        .unwrap()
        .expect("Rejoin sent");
    assert_eq!(rejoin.kind(), "joinGame");

    // While we were away player1's move reached the relay.
    let table = RuleTable::standard();
    let board = table.initial_board();
    let mut relay_view = MatchState::new(
        Arc::new(GridOracle::new(table)),
        Role::Player1,
        board,
        ClockPair::new(600),
    );
    relay_view.select("B3".parse().unwrap()).unwrap();
    relay_view.commit("B4".parse().unwrap()).unwrap();
    let game = Encoded::inline(&SnapshotPayload::from(&relay_view.snapshot())).unwrap();
    second_tx
        .send(Inbound::GameState {
            match_id: Some("m1".to_string()),
            players: vec![bob()],
            game: Some(game),
            result: None,
        })
        .unwrap();

    wait_for(&mut events, |event| {
        matches!(event, AppEvent::StateChanged(view)
            if view.current_turn == Role::Player2
                && view.phase == TurnPhase::Locked
                && view.last_move.is_some())
    })
    .await;

    drop(commands);
    let session = timeout(WAIT, driver).await.unwrap().unwrap().unwrap();
    assert!(session.is_connected());
    assert!(!session.is_syncing());
    assert_eq!(session.state().current_turn(), Role::Player2);
    assert_eq!(session.state().phase(), TurnPhase::Locked);
    assert_eq!(session.state().log().len(), 1);
    drop(second_tx);
}
