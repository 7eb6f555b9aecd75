//! Per-client synchronization session.
//!
//! A [`SyncSession`] owns one client's match state and reconciles it with
//! everything that arrives from the peer and the relay. It performs no I/O:
//! every operation returns the messages to send, and state changes are
//! published on the [`EventBus`].

use crate::bus::{AppEvent, EventBus};
use crate::protocol::{
    decode_snapshot, parse_outcome, Encoded, GameEndedPayload, Inbound, MoveLogPayload,
    Outbound, PlayerInfo, PresencePayload, RatingPayload, SnapshotPayload,
};
use crate::view::{MatchView, PieceView};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use duel_core::{
    ClockTick, ConnectionStatus, DisconnectTimer, EndNotice, Finish, Intent, MatchResult,
    MatchState, MoveError, Outcome, RatingSettlement, Reconciliation, Resolution, ResultReason,
    ResultResolver, Role, SnapshotSource, Transition, TurnPhase, WinCondition,
};
use tracing::{debug, info, instrument, warn};

/// Who this client is in the match.
#[derive(Debug, Clone, PartialEq, Eq, Getters, derive_new::new)]
pub struct Identity {
    /// User id.
    user_id: String,
    /// Match id.
    match_id: String,
    /// Seat.
    role: Role,
    /// Guest account.
    guest: bool,
}

/// One client's side of a match.
#[derive(Debug)]
pub struct SyncSession {
    identity: Identity,
    state: MatchState,
    results: ResultResolver,
    roster: Vec<PlayerInfo>,
    peer: ConnectionStatus,
    timer: DisconnectTimer,
    connected: bool,
    syncing: bool,
    settlement_sent: bool,
    bus: EventBus,
}

fn win_condition(reason: ResultReason) -> Option<WinCondition> {
    match reason {
        ResultReason::CommanderCaptured => Some(WinCondition::CommanderCaptured),
        ResultReason::NoPiecesLeft => Some(WinCondition::NoPiecesLeft),
        _ => None,
    }
}

impl SyncSession {
    /// Creates a session around a fresh or restored match state.
    pub fn new(identity: Identity, state: MatchState, timer: DisconnectTimer, bus: EventBus) -> Self {
        Self {
            identity,
            state,
            results: ResultResolver::new(),
            roster: Vec::new(),
            peer: ConnectionStatus::default(),
            timer,
            connected: false,
            syncing: false,
            settlement_sent: false,
            bus,
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Accessors
    // ─────────────────────────────────────────────────────────────

    /// Who this client is.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The match state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Last roster received from the relay.
    pub fn roster(&self) -> &[PlayerInfo] {
        &self.roster
    }

    /// What is known about the peer's connection.
    pub fn peer(&self) -> &ConnectionStatus {
        &self.peer
    }

    /// Whether the relay connection is up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a full-state sync is in flight.
    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    /// Whether this client already sent its `gameEnd`.
    pub fn settlement_sent(&self) -> bool {
        self.settlement_sent
    }

    /// Whether the match is over for this client.
    pub fn is_over(&self) -> bool {
        self.state.is_frozen() || self.results.is_resolved()
    }

    /// The reconciled result.
    pub fn result(&self) -> Option<MatchResult> {
        self.results.result()
    }

    // ─────────────────────────────────────────────────────────────
    //  Connection lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Starts the session on a channel.
    ///
    /// On the relay this joins the match and waits for the full state; clocks
    /// hold still until it arrives.
    #[instrument(skip(self), fields(user = %self.identity.user_id, match_id = %self.identity.match_id))]
    pub fn connect(&mut self, networked: bool) -> Vec<Outbound> {
        self.connected = networked;
        if !networked {
            info!("Playing on the same-device channel");
            self.publish_state();
            return Vec::new();
        }
        info!("Joining match");
        self.syncing = true;
        vec![Outbound::JoinGame {
            match_id: self.identity.match_id.clone(),
            user_id: self.identity.user_id.clone(),
        }]
    }

    /// Records loss of the relay connection. State and clocks carry on.
    #[instrument(skip(self))]
    pub fn disconnected(&mut self) {
        if !self.connected {
            return;
        }
        warn!("Relay connection lost");
        self.connected = false;
        self.syncing = false;
        self.bus.publish(AppEvent::ConnectionLost);
    }

    /// Keep-alive, while connected and the match is running.
    pub fn heartbeat(&self) -> Option<Outbound> {
        if !self.connected || self.is_over() {
            return None;
        }
        Some(Outbound::PlayerHeartbeat {
            match_id: self.identity.match_id.clone(),
        })
    }

    // ─────────────────────────────────────────────────────────────
    //  Local input
    // ─────────────────────────────────────────────────────────────

    /// Applies a local intent. Refused intents change nothing and send nothing.
    ///
    /// While the join resync is in flight the board is stale, so only
    /// resignation goes through.
    #[instrument(skip(self), fields(role = %self.identity.role))]
    pub fn handle_command(&mut self, intent: Intent) -> Result<Vec<Outbound>, MoveError> {
        if self.syncing && intent != Intent::Resign {
            debug!("Waiting for the relay's full state");
            return Err(MoveError::WrongPhase(TurnPhase::Locked));
        }
        let outbound = match intent {
            Intent::Select { at } => {
                self.state.select(at)?;
                Vec::new()
            }
            Intent::Cancel => {
                self.state.cancel()?;
                Vec::new()
            }
            Intent::Commit { to } => {
                let transition = self.state.commit(to)?;
                let mut outbound = vec![self.move_message()];
                if let Transition::Won { winner, condition } = transition {
                    outbound.extend(self.conclude(
                        Outcome::Winner(winner),
                        ResultReason::from(condition),
                        Some(condition),
                    ));
                }
                outbound
            }
            Intent::Resign => self.resign()?,
        };
        self.publish_state();
        Ok(outbound)
    }

    fn resign(&mut self) -> Result<Vec<Outbound>, MoveError> {
        if self.is_over() {
            return Err(MoveError::MatchOver);
        }
        let winner = self.identity.role.opponent();
        info!(%winner, "Resigning");
        self.state
            .freeze(Outcome::Winner(winner), ResultReason::Resignation);
        self.record_end(EndNotice::new(
            Outcome::Winner(winner),
            ResultReason::Resignation,
            self.user_of(winner),
            Some(self.identity.user_id.clone()),
            None,
        ));
        Ok(vec![
            self.move_message(),
            Outbound::LeaveGame {
                match_id: self.identity.match_id.clone(),
            },
        ])
    }

    /// One-second clock tick.
    pub fn clock_tick(&mut self) -> Vec<Outbound> {
        match self.state.tick_clock(self.syncing) {
            ClockTick::Idle => Vec::new(),
            ClockTick::Running(_) => {
                self.publish_state();
                Vec::new()
            }
            ClockTick::Expired(loser) => {
                info!(%loser, "Clock expired");
                let outbound =
                    self.conclude(Outcome::Winner(loser.opponent()), ResultReason::Timeout, None);
                self.publish_state();
                outbound
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    //  Inbound messages
    // ─────────────────────────────────────────────────────────────

    /// Applies a message from the channel. Malformed content is logged and dropped.
    pub fn handle_inbound(&mut self, message: Inbound) -> Vec<Outbound> {
        let outbound = match message {
            Inbound::MoveMade {
                snapshot, actor_id, ..
            } => self.on_peer_move(&snapshot, actor_id.as_deref()),
            Inbound::GameState {
                match_id,
                players,
                game,
                result,
            } => self.on_game_state(match_id, players, game, result),
            Inbound::GameEnded(payload) => {
                self.on_game_ended(payload);
                Vec::new()
            }
            Inbound::RatingUpdate(payload) => {
                self.on_rating(payload);
                Vec::new()
            }
            Inbound::PlayerJoined(presence) | Inbound::PlayerReconnected(presence) => {
                self.on_presence(presence, true);
                Vec::new()
            }
            Inbound::PlayerDisconnected(presence) => {
                self.on_presence(presence, false);
                Vec::new()
            }
            Inbound::OpponentDisconnected(presence) => {
                self.on_presence(
                    PresencePayload {
                        user_id: None,
                        ..presence
                    },
                    false,
                );
                Vec::new()
            }
            Inbound::Unknown => {
                debug!("Unknown message ignored");
                Vec::new()
            }
        };
        self.publish_state();
        outbound
    }

    #[instrument(skip(self, encoded))]
    fn on_peer_move(&mut self, encoded: &Encoded, actor: Option<&str>) -> Vec<Outbound> {
        if actor == Some(self.identity.user_id.as_str()) {
            debug!("Own broadcast echoed back, ignored");
            return Vec::new();
        }
        let snapshot = match decode_snapshot(encoded) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Malformed move dropped");
                return Vec::new();
            }
        };
        match self.state.apply_snapshot(snapshot, SnapshotSource::PeerMove) {
            Reconciliation::Finished(finish) => self.on_finish(finish),
            Reconciliation::Applied { diverged } => {
                debug!(diverged, phase = %self.state.phase(), "Peer move applied");
                Vec::new()
            }
            Reconciliation::Ignored => Vec::new(),
        }
    }

    #[instrument(skip(self, players, game, result), fields(players = players.len()))]
    fn on_game_state(
        &mut self,
        match_id: Option<String>,
        players: Vec<PlayerInfo>,
        game: Option<Encoded>,
        result: Option<GameEndedPayload>,
    ) -> Vec<Outbound> {
        self.syncing = false;
        if !players.is_empty() {
            self.roster = players;
        }
        self.bus.publish(AppEvent::MatchFound {
            match_id: match_id.unwrap_or_else(|| self.identity.match_id.clone()),
            role: self.identity.role,
        });

        let opponent = self.identity.role.opponent();
        if let Some(peer) = self.roster.iter().find(|p| p.role == opponent) {
            self.peer = if peer.connected {
                ConnectionStatus::default()
            } else {
                ConnectionStatus {
                    connected: false,
                    disconnected_at: peer
                        .disconnected_at
                        .or(self.peer.disconnected_at)
                        .or_else(|| Some(Utc::now())),
                }
            };
            self.publish_presence();
        }

        let mut outbound = Vec::new();
        if let Some(game) = game {
            match decode_snapshot(&game) {
                Ok(snapshot) => {
                    if let Reconciliation::Finished(finish) =
                        self.state.apply_snapshot(snapshot, SnapshotSource::Server)
                    {
                        outbound.extend(self.on_finish(finish));
                    }
                    info!(
                        turn = %self.state.current_turn(),
                        phase = %self.state.phase(),
                        "Resynchronized from relay"
                    );
                }
                Err(e) => warn!(error = %e, "Malformed game state dropped"),
            }
        }
        if let Some(result) = result {
            self.on_game_ended(result);
        }
        outbound
    }

    fn on_finish(&mut self, finish: Finish) -> Vec<Outbound> {
        self.conclude(finish.outcome, finish.reason, win_condition(finish.reason))
    }

    #[instrument(skip(self, payload), fields(reason = %payload.reason))]
    fn on_game_ended(&mut self, payload: GameEndedPayload) {
        let Some(outcome) = self.outcome_of(&payload) else {
            warn!("Game end without a resolvable winner dropped");
            return;
        };
        self.state.freeze(outcome, payload.reason);
        self.record_end(EndNotice::new(
            outcome,
            payload.reason,
            payload.winner_id,
            payload.loser_id,
            payload.score,
        ));
    }

    #[instrument(skip(self, payload), fields(winner = %payload.winner_id, change = payload.change))]
    fn on_rating(&mut self, payload: RatingPayload) {
        let winner_role = self
            .role_of_user(&payload.winner_id)
            .or_else(|| self.role_of_user(&payload.loser_id).map(Role::opponent));
        let Some(winner_role) = winner_role else {
            warn!("Rating update for unknown players dropped");
            return;
        };
        self.state
            .freeze(Outcome::Winner(winner_role), payload.reason);
        let resolution = self.results.record_rating(RatingSettlement::new(
            winner_role,
            payload.winner_id,
            payload.loser_id,
            payload.winner_new_rating,
            payload.loser_new_rating,
            payload.change,
            payload.reason,
        ));
        self.announce(resolution);
    }

    fn on_presence(&mut self, presence: PresencePayload, connected: bool) {
        if presence.user_id.as_deref() == Some(self.identity.user_id.as_str()) {
            return;
        }
        if connected {
            self.peer.mark_connected();
        } else {
            self.peer
                .mark_disconnected(presence.disconnected_at.unwrap_or_else(Utc::now));
        }
        debug!(connected, "Peer presence changed");
        self.publish_presence();
    }

    // ─────────────────────────────────────────────────────────────
    //  Results
    // ─────────────────────────────────────────────────────────────

    /// Records a locally observed end and settles it if this client won.
    fn conclude(
        &mut self,
        outcome: Outcome,
        reason: ResultReason,
        condition: Option<WinCondition>,
    ) -> Vec<Outbound> {
        self.state.freeze(outcome, reason);
        let (winner_id, loser_id) = match outcome.winner() {
            Some(winner) => (self.user_of(winner), self.user_of(winner.opponent())),
            None => (None, None),
        };
        self.record_end(EndNotice::new(outcome, reason, winner_id, loser_id, None));
        self.settlement(outcome, reason, condition).into_iter().collect()
    }

    /// The authoritative `gameEnd`: only the winner sends it, once, and only online.
    fn settlement(
        &mut self,
        outcome: Outcome,
        reason: ResultReason,
        condition: Option<WinCondition>,
    ) -> Option<Outbound> {
        let winner = outcome.winner()?;
        if winner != self.identity.role {
            debug!("Losing side leaves settlement to the winner");
            return None;
        }
        if !self.connected {
            debug!("Offline, no settlement sent");
            return None;
        }
        if self.settlement_sent {
            return None;
        }
        if reason == ResultReason::Resignation {
            debug!("Resigning side's leaveGame settles the match");
            return None;
        }
        self.settlement_sent = true;
        info!(%reason, "Sending game end");
        Some(Outbound::GameEnd {
            match_id: self.identity.match_id.clone(),
            winner_role: winner,
            winner_id: self.user_of(winner),
            loser_id: self.user_of(winner.opponent()),
            reason,
            win_condition: condition,
            move_history: self
                .state
                .log()
                .entries()
                .iter()
                .map(MoveLogPayload::from)
                .collect(),
        })
    }

    fn record_end(&mut self, notice: EndNotice) -> Resolution {
        let resolution = self.results.record_end(notice);
        self.announce(resolution);
        resolution
    }

    fn announce(&self, resolution: Resolution) {
        if resolution == Resolution::Ignored {
            return;
        }
        if let Some(result) = self.results.result() {
            self.bus.publish(AppEvent::MatchEnded(result));
        }
    }

    fn outcome_of(&self, payload: &GameEndedPayload) -> Option<Outcome> {
        if let Some(raw) = &payload.winner {
            match parse_outcome(raw) {
                Ok(outcome) => return Some(outcome),
                Err(e) => debug!(error = %e, "Winner field not a role, trying ids"),
            }
        }
        if payload.reason == ResultReason::Draw {
            return Some(Outcome::Draw);
        }
        payload
            .winner_id
            .as_deref()
            .and_then(|id| self.role_of_user(id))
            .or_else(|| {
                payload
                    .loser_id
                    .as_deref()
                    .and_then(|id| self.role_of_user(id))
                    .map(Role::opponent)
            })
            .map(Outcome::Winner)
    }

    fn user_of(&self, role: Role) -> Option<String> {
        if role == self.identity.role {
            return Some(self.identity.user_id.clone());
        }
        self.roster
            .iter()
            .find(|p| p.role == role)
            .map(|p| p.user_id.clone())
    }

    fn role_of_user(&self, user_id: &str) -> Option<Role> {
        if user_id == self.identity.user_id {
            return Some(self.identity.role);
        }
        self.roster
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.role)
    }

    // ─────────────────────────────────────────────────────────────
    //  Views
    // ─────────────────────────────────────────────────────────────

    fn move_message(&self) -> Outbound {
        Outbound::MoveMade {
            match_id: self.identity.match_id.clone(),
            snapshot: SnapshotPayload::from(&self.state.snapshot()),
            actor_id: self.identity.user_id.clone(),
        }
    }

    /// Seconds before the relay forfeits the peer, if it is away.
    pub fn forfeit_in(&self, now: DateTime<Utc>) -> Option<i64> {
        self.timer.remaining(&self.peer, now)
    }

    /// Display-ready view.
    pub fn view(&self) -> MatchView {
        let oracle = self.state.oracle();
        let selection = self.state.selection();
        let mut targets: Vec<_> = selection
            .map(|s| {
                s.moves
                    .simple
                    .iter()
                    .chain(&s.moves.advance)
                    .chain(&s.attacks)
                    .copied()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if let Some(chain) = self.state.pending() {
            targets.extend(chain.attacks.iter().chain(&chain.moves).copied());
        }
        MatchView {
            local_role: self.identity.role,
            current_turn: self.state.current_turn(),
            phase: if self.syncing {
                TurnPhase::Locked
            } else {
                self.state.phase()
            },
            pieces: self
                .state
                .board()
                .pieces()
                .map(|(id, at)| PieceView {
                    id: id.clone(),
                    at: *at,
                    owner: oracle.piece_owner(id),
                    name: oracle.display_name(id),
                })
                .collect(),
            selected: selection
                .map(|s| s.from)
                .or_else(|| self.state.pending().map(|chain| chain.at)),
            targets,
            pending: self.state.pending().cloned(),
            clocks: *self.state.clocks(),
            captures: self.state.captures().clone(),
            last_move: self.state.log().last().cloned(),
            peer_connected: self.peer.connected,
            forfeit_in: self.forfeit_in(Utc::now()),
            result: self.results.result(),
        }
    }

    fn publish_state(&self) {
        self.bus
            .publish(AppEvent::StateChanged(Box::new(self.view())));
    }

    fn publish_presence(&self) {
        self.bus.publish(AppEvent::PeerPresence {
            connected: self.peer.connected,
            disconnected_at: self.peer.disconnected_at,
        });
    }
}
